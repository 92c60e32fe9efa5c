use thiserror::Error;

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Infrastructure errors for dispatch, codec, registry and broker operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Envelope bytes could not be decoded. Never retried: the payload is unusable.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Envelope decoded but no handler is registered under its function name
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Broker connection, push or pop failed
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Function already registered: {0}")]
    DuplicateFunction(String),

    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("Job execution failed: {0}")]
    JobFailed(#[from] JobError),

    #[error("Dispatcher is closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Codec and registry failures are fatal to the job; broker outages and
    /// retryable handler failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BrokerUnavailable(_) => true,
            Self::JobFailed(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Job execution outcome reported by handlers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Retryable error - an external retry layer may redeliver the job
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Permanent error - redelivery will not help
    #[error("Permanent error: {0}")]
    Permanent(String),
}

impl JobError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}

/// Lets handlers that enqueue follow-up jobs use `?` on dispatcher calls.
impl From<DispatchError> for JobError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::JobFailed(inner) => inner,
            other if other.is_retryable() => Self::Retryable(other.to_string()),
            other => Self::Permanent(other.to_string()),
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for DispatchError {
    fn from(err: redis::RedisError) -> Self {
        Self::BrokerUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(DispatchError::BrokerUnavailable("down".into()).is_retryable());
        assert!(DispatchError::JobFailed(JobError::retryable("later")).is_retryable());
        assert!(!DispatchError::JobFailed(JobError::permanent("bad input")).is_retryable());
        assert!(!DispatchError::MalformedEnvelope("eof".into()).is_retryable());
        assert!(!DispatchError::UnknownFunction("nope".into()).is_retryable());
    }

    #[test]
    fn test_dispatch_error_into_job_error() {
        let err: JobError = DispatchError::BrokerUnavailable("refused".into()).into();
        assert!(err.is_retryable());
        assert!(err.message().contains("refused"));

        let err: JobError = DispatchError::JobFailed(JobError::permanent("boom")).into();
        assert_eq!(err, JobError::permanent("boom"));

        let err: JobError = DispatchError::Closed.into();
        assert!(!err.is_retryable());
    }
}
