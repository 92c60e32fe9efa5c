#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "memory")]
pub use self::memory::MemoryBroker;

#[cfg(feature = "redis")]
pub use self::redis::RedisBroker;

use std::time::Duration;

use async_trait::async_trait;

use crate::{DispatchResult, QueueName};

/// A connection checked out of a broker pool; returned to the pool on drop
pub type PooledConnection = Box<dyn BrokerConnection>;

/// Durable FIFO list store shared by producers and workers
#[async_trait]
pub trait Broker: Send + Sync {
    /// Check out a connection, waiting while the pool is exhausted
    async fn acquire(&self) -> DispatchResult<PooledConnection>;

    /// Release pooled resources. Called once by `Dispatcher::close`.
    async fn close(&self) {}

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Queue primitives available on a pooled connection
#[async_trait]
pub trait BrokerConnection: Send {
    /// Append a payload to the tail of `queue`
    async fn push(&mut self, queue: &QueueName, payload: &[u8]) -> DispatchResult<()>;

    /// Remove and return the head of the first non-empty queue, checking
    /// `queues` in order. Waits up to `timeout` for a push; `None` on expiry.
    ///
    /// A delivered payload belongs to exactly one caller.
    async fn pop(&mut self, queues: &[QueueName], timeout: Duration) -> DispatchResult<Option<Delivery>>;
}

/// A payload removed from a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queue: QueueName,
    pub payload: Vec<u8>,
}
