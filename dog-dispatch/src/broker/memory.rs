use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::broker::{Broker, BrokerConnection, Delivery, PooledConnection};
use crate::{DispatchError, DispatchResult, QueueName};

const DEFAULT_MAX_CONNECTIONS: usize = 16;

/// In-process broker for tests and single-process deployments.
///
/// Clones share the same queues, so a test can keep one handle for
/// inspection while a dispatcher and a worker use others.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<MemoryState>,
}

struct MemoryState {
    queues: Mutex<HashMap<QueueName, VecDeque<Vec<u8>>>>,
    pushed: Notify,
    pool: Arc<Semaphore>,
    max_connections: usize,
    available: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_max_connections(DEFAULT_MAX_CONNECTIONS)
    }

    pub fn with_max_connections(max_connections: usize) -> Self {
        let max_connections = max_connections.max(1);
        Self {
            state: Arc::new(MemoryState {
                queues: Mutex::new(HashMap::new()),
                pushed: Notify::new(),
                pool: Arc::new(Semaphore::new(max_connections)),
                max_connections,
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Simulate an outage: while unavailable, acquire, push and pop fail
    /// with `BrokerUnavailable`
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
        self.state.pushed.notify_waiters();
    }

    pub fn is_available(&self) -> bool {
        self.state.available.load(Ordering::SeqCst)
    }

    /// Number of payloads waiting on `queue`
    pub fn len(&self, queue: &QueueName) -> usize {
        self.state.queues.lock().get(queue).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, queue: &QueueName) -> bool {
        self.len(queue) == 0
    }

    /// Payloads waiting across every queue
    pub fn total_len(&self) -> usize {
        self.state.queues.lock().values().map(VecDeque::len).sum()
    }

    /// Remove and return everything on `queue`, head first
    pub fn drain(&self, queue: &QueueName) -> Vec<Vec<u8>> {
        self.state
            .queues
            .lock()
            .get_mut(queue)
            .map(|items| items.drain(..).collect())
            .unwrap_or_default()
    }

    /// Append a payload without checking out a connection
    pub fn push_raw(&self, queue: &QueueName, payload: impl Into<Vec<u8>>) {
        self.state
            .queues
            .lock()
            .entry(queue.clone())
            .or_default()
            .push_back(payload.into());
        self.state.pushed.notify_waiters();
    }

    /// Connections currently checked out of the pool
    pub fn connections_in_use(&self) -> usize {
        self.state.max_connections - self.state.pool.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.state.max_connections
    }

    fn check_available(&self) -> DispatchResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(DispatchError::BrokerUnavailable(
                "memory broker is unavailable".to_string(),
            ))
        }
    }

    fn try_pop(&self, queues: &[QueueName]) -> Option<Delivery> {
        let mut lists = self.state.queues.lock();
        queues.iter().find_map(|queue| {
            lists
                .get_mut(queue)
                .and_then(VecDeque::pop_front)
                .map(|payload| Delivery {
                    queue: queue.clone(),
                    payload,
                })
        })
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn acquire(&self) -> DispatchResult<PooledConnection> {
        self.check_available()?;
        let permit = self
            .state
            .pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::BrokerUnavailable("memory broker pool closed".to_string()))?;

        Ok(Box::new(MemoryConnection {
            broker: self.clone(),
            _permit: permit,
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryConnection {
    broker: MemoryBroker,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn push(&mut self, queue: &QueueName, payload: &[u8]) -> DispatchResult<()> {
        self.broker.check_available()?;
        self.broker.push_raw(queue, payload);
        Ok(())
    }

    async fn pop(&mut self, queues: &[QueueName], timeout: Duration) -> DispatchResult<Option<Delivery>> {
        let deadline = Instant::now() + timeout;
        loop {
            self.broker.check_available()?;

            // Register interest before checking so a push in between is not missed
            let notified = self.broker.state.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.broker.try_pop(queues) {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}
