//! Redis list broker: `RPUSH` to enqueue, `BLPOP` to fetch.
//!
//! `BLPOP` blocks the connection it runs on, so each pooled connection is its
//! own `ConnectionManager` instead of a clone of one multiplexed handle.
//! Idle managers are kept and reused; the pool size caps how many exist.

use std::sync::Arc;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::Client;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument};

use crate::broker::{Broker, BrokerConnection, Delivery, PooledConnection};
use crate::{DispatchError, DispatchResult, QueueName};

/// Redis-backed broker with a bounded connection pool
#[derive(Clone)]
pub struct RedisBroker {
    pool: Arc<RedisPool>,
}

struct RedisPool {
    client: Client,
    idle: Mutex<Vec<ConnectionManager>>,
    permits: Arc<Semaphore>,
}

impl RedisBroker {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`), opening one
    /// connection eagerly so a bad URL fails here rather than on first enqueue
    #[instrument(skip(url))]
    pub async fn connect(url: &str, max_connections: usize) -> DispatchResult<Self> {
        let client = Client::open(url)?;
        let first = ConnectionManager::new(client.clone()).await?;

        info!(max_connections, "connected to redis broker");

        Ok(Self {
            pool: Arc::new(RedisPool {
                client,
                idle: Mutex::new(vec![first]),
                permits: Arc::new(Semaphore::new(max_connections.max(1))),
            }),
        })
    }

    /// Free slots left in the pool
    pub fn available_connections(&self) -> usize {
        self.pool.permits.available_permits()
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn acquire(&self) -> DispatchResult<PooledConnection> {
        let permit = self
            .pool
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::BrokerUnavailable("redis pool closed".to_string()))?;

        let reused = self.pool.idle.lock().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                debug!("opening new redis connection");
                ConnectionManager::new(self.pool.client.clone()).await?
            }
        };

        Ok(Box::new(RedisConnection {
            conn: Some(conn),
            pool: self.pool.clone(),
            _permit: permit,
        }))
    }

    async fn close(&self) {
        self.pool.permits.close();
        self.pool.idle.lock().clear();
        info!("redis broker closed");
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

struct RedisConnection {
    conn: Option<ConnectionManager>,
    pool: Arc<RedisPool>,
    _permit: OwnedSemaphorePermit,
}

impl RedisConnection {
    fn conn(&mut self) -> DispatchResult<&mut ConnectionManager> {
        self.conn
            .as_mut()
            .ok_or_else(|| DispatchError::BrokerUnavailable("connection already released".to_string()))
    }
}

impl Drop for RedisConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if !self.pool.permits.is_closed() {
                self.pool.idle.lock().push(conn);
            }
        }
    }
}

#[async_trait]
impl BrokerConnection for RedisConnection {
    async fn push(&mut self, queue: &QueueName, payload: &[u8]) -> DispatchResult<()> {
        let conn = self.conn()?;
        let _len: i64 = ::redis::cmd("RPUSH")
            .arg(queue.as_bytes())
            .arg(payload)
            .query_async(conn)
            .await?;
        Ok(())
    }

    async fn pop(&mut self, queues: &[QueueName], timeout: Duration) -> DispatchResult<Option<Delivery>> {
        // BLPOP treats 0 as "block forever"
        let seconds = timeout.as_secs().max(1);

        let mut cmd = ::redis::cmd("BLPOP");
        for queue in queues {
            cmd.arg(queue.as_bytes());
        }
        cmd.arg(seconds);

        let conn = self.conn()?;
        let reply: Option<(Vec<u8>, Vec<u8>)> = cmd.query_async(conn).await?;

        Ok(reply.map(|(key, payload)| Delivery {
            queue: QueueName::new(String::from_utf8_lossy(&key).into_owned()),
            payload,
        }))
    }
}
