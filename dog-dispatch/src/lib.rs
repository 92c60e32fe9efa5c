//! # dog-dispatch: distributed job dispatch
//!
//! Producers call registered async functions by name; the call is packed into
//! a MessagePack envelope and, depending on the [`ExecutionMode`], run inline,
//! run on a tracked background task, or pushed onto a priority queue for a
//! [`Worker`] in another process.
//!
//! - **Envelopes**: `[queued_at, origin_name, function_name, args, kwargs]`
//!   in MessagePack, binary arguments kept distinct from text
//! - **Priority queues**: `dog:high`, `dog:default`, `dog:low`, drained in that order
//! - **Three modes**: `queued` (default), `direct` for tests and scripts,
//!   `scheduled` for in-process background work joined on [`Dispatcher::close`]
//! - **Async-only handlers**: registering a function that cannot be awaited
//!   is a compile error
//! - **Pluggable brokers**: in-memory (default) and Redis lists (`redis` feature)
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use dog_dispatch::prelude::*;
//! use dog_dispatch::broker::MemoryBroker;
//!
//! #[derive(Clone)]
//! struct Mailer;
//!
//! async fn send_welcome(_mailer: Mailer, args: JobArgs) -> Result<(), JobError> {
//!     let _user_id = args.int(0)?;
//!     Ok(())
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), DispatchError> {
//! let mut registry = FunctionRegistry::new();
//! let welcome = registry.register_on(QueueName::HIGH, "send_welcome", send_welcome)?;
//! let registry = registry.into_shared();
//!
//! // Producer side
//! let broker = MemoryBroker::new();
//! let dispatcher = Dispatcher::new(registry.clone(), Mailer, Arc::new(broker.clone()));
//! welcome.call(&dispatcher).arg(42).send().await?;
//! assert_eq!(broker.len(&QueueName::HIGH), 1);
//!
//! // Worker side
//! let worker = Worker::new(registry, Mailer, Arc::new(broker));
//! let outcome = worker.poll_once().await?;
//! assert!(outcome.map_or(false, |outcome| outcome.is_success()));
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod execution;
pub mod job;
pub mod mode;
pub mod observability;
pub mod types;
pub mod worker;

// Core API exports
pub use codec::Value;
pub use config::{DispatchConfig, WorkerConfig};
pub use dispatcher::{Dispatcher, EnqueueRequest};
pub use error::{DispatchError, DispatchResult, JobError};
pub use execution::{JobExecutor, JobOutcome};
pub use job::{FunctionRegistry, JobHandler, JobStub, RegisteredFunction};
pub use mode::{ExecutionMode, ModeSelector};
pub use types::{Envelope, JobArgs, JobPriority, Kwargs, QueueName};
pub use worker::{Worker, WorkerHandle};

pub use broker::{Broker, BrokerConnection, Delivery};
pub use observability::{LiveMetrics, MetricsSnapshot};

/// Everything needed to register, enqueue and run jobs
pub mod prelude {
    pub use crate::{
        Dispatcher, EnqueueRequest, ExecutionMode, FunctionRegistry, JobHandler, JobStub,
        ModeSelector, Worker, WorkerHandle,
    };

    // Essential types
    pub use crate::{
        DispatchConfig, DispatchError, DispatchResult, JobArgs, JobError, JobPriority, QueueName,
        Value, WorkerConfig,
    };

    pub use crate::Broker;

    pub use async_trait::async_trait;
}
