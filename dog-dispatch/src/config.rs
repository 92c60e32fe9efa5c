//! Dispatcher and worker settings, loadable from `DOG_*` environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `DOG_DISPATCH_MODE` | `queued` |
//! | `DOG_DISPATCH_ORIGIN` | `dog-dispatch` |
//! | `DOG_DISPATCH_BROKER_URL` | `redis://127.0.0.1:6379/0` |
//! | `DOG_DISPATCH_MAX_CONNECTIONS` | `16` |
//! | `DOG_WORKER_QUEUES` | `dog:high,dog:default,dog:low` |
//! | `DOG_WORKER_POLL_TIMEOUT_MS` | `1000` |
//! | `DOG_WORKER_MAX_JOBS` | `10` |
//! | `DOG_WORKER_BASE_BACKOFF_MS` | `100` |
//! | `DOG_WORKER_MAX_BACKOFF_MS` | `30000` |
//!
//! Unset variables keep their default; set but unparsable ones are an error.

use std::str::FromStr;
use std::time::Duration;

use crate::dispatcher::DEFAULT_ORIGIN;
use crate::{DispatchError, DispatchResult, ExecutionMode, QueueName};

/// Producer-side configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    pub mode: ExecutionMode,
    /// Producer identity written into every envelope
    pub origin_name: String,
    pub broker_url: String,
    /// Upper bound on pooled broker connections
    pub max_connections: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Queued,
            origin_name: DEFAULT_ORIGIN.to_string(),
            broker_url: "redis://127.0.0.1:6379/0".to_string(),
            max_connections: 16,
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> DispatchResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup; `from_env` passes `std::env::var`
    pub fn from_lookup<F>(lookup: F) -> DispatchResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let max_connections = parse_or(&lookup, "DOG_DISPATCH_MAX_CONNECTIONS", defaults.max_connections)?;
        if max_connections == 0 {
            return Err(DispatchError::InvalidConfig(
                "DOG_DISPATCH_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            mode: parse_or(&lookup, "DOG_DISPATCH_MODE", defaults.mode)?,
            origin_name: lookup("DOG_DISPATCH_ORIGIN").unwrap_or(defaults.origin_name),
            broker_url: lookup("DOG_DISPATCH_BROKER_URL").unwrap_or(defaults.broker_url),
            max_connections,
        })
    }
}

/// Worker loop configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Queues polled, highest priority first
    pub queues: Vec<QueueName>,
    /// Longest single blocking pop; bounds how long shutdown waits on an idle broker
    pub poll_timeout: Duration,
    /// Jobs run concurrently by one worker
    pub max_jobs: usize,
    /// First delay after a broker error
    pub base_backoff: Duration,
    /// Cap for the doubling broker-error delay
    pub max_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queues: QueueName::defaults(),
            poll_timeout: Duration::from_secs(1),
            max_jobs: 10,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> DispatchResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> DispatchResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let queues = match lookup("DOG_WORKER_QUEUES") {
            Some(raw) => parse_queues(&raw)?,
            None => defaults.queues,
        };
        let max_jobs = parse_or(&lookup, "DOG_WORKER_MAX_JOBS", defaults.max_jobs)?;
        if max_jobs == 0 {
            return Err(DispatchError::InvalidConfig(
                "DOG_WORKER_MAX_JOBS must be at least 1".to_string(),
            ));
        }

        let config = Self {
            queues,
            poll_timeout: millis_or(&lookup, "DOG_WORKER_POLL_TIMEOUT_MS", defaults.poll_timeout)?,
            max_jobs,
            base_backoff: millis_or(&lookup, "DOG_WORKER_BASE_BACKOFF_MS", defaults.base_backoff)?,
            max_backoff: millis_or(&lookup, "DOG_WORKER_MAX_BACKOFF_MS", defaults.max_backoff)?,
        };

        if config.base_backoff > config.max_backoff {
            return Err(DispatchError::InvalidConfig(format!(
                "base backoff {:?} exceeds max backoff {:?}",
                config.base_backoff, config.max_backoff
            )));
        }
        Ok(config)
    }

    pub fn with_queues<I, Q>(mut self, queues: I) -> Self
    where
        I: IntoIterator<Item = Q>,
        Q: Into<QueueName>,
    {
        self.queues = queues.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max.max(base);
        self
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> DispatchResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| DispatchError::InvalidConfig(format!("{}={:?}: {}", key, raw, err))),
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> DispatchResult<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(lookup, key, default_ms).map(Duration::from_millis)
}

fn parse_queues(raw: &str) -> DispatchResult<Vec<QueueName>> {
    let queues: Vec<QueueName> = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(QueueName::from)
        .collect();

    if queues.is_empty() {
        return Err(DispatchError::InvalidConfig(
            "DOG_WORKER_QUEUES names no queues".to_string(),
        ));
    }
    Ok(queues)
}
