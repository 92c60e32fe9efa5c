pub mod args;
pub mod envelope;
pub mod priority;
pub mod queue;

pub use args::{JobArgs, Kwargs};
pub use envelope::Envelope;
pub use priority::JobPriority;
pub use queue::QueueName;
