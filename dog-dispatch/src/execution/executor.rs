use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    job::FunctionRegistry, observability::LiveMetrics, DispatchError, DispatchResult, Envelope,
    JobError, QueueName,
};

/// Decodes raw envelopes, resolves the function and runs it.
///
/// Shared by direct and scheduled dispatch and by the worker loop, so every
/// path goes through the same decode → resolve → invoke sequence.
pub struct JobExecutor<C> {
    registry: Arc<FunctionRegistry<C>>,
    context: C,
    metrics: Arc<LiveMetrics>,
}

impl<C: Clone> Clone for JobExecutor<C> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            context: self.context.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<C> JobExecutor<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn new(registry: Arc<FunctionRegistry<C>>, context: C) -> Self {
        Self {
            registry,
            context,
            metrics: Arc::new(LiveMetrics::new()),
        }
    }

    /// Share a metrics collector with other components
    pub fn with_metrics(mut self, metrics: Arc<LiveMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry<C>> {
        &self.registry
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn metrics(&self) -> &Arc<LiveMetrics> {
        &self.metrics
    }

    /// Run one raw envelope taken from `queue`
    #[instrument(skip(self, raw), fields(queue = %queue, bytes = raw.len()))]
    pub async fn run(&self, queue: &QueueName, raw: &[u8]) -> JobOutcome {
        let started = Instant::now();

        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "dropping malformed envelope");
                self.metrics.record_malformed();
                return JobOutcome::new(queue, None, started, Err(err));
            }
        };

        let function_name = envelope.function_name().to_string();
        let function = match self.registry.resolve(&function_name) {
            Ok(function) => function.clone(),
            Err(err) => {
                error!(
                    function = %function_name,
                    origin = %envelope.origin_name(),
                    "no handler registered for function; producer and worker registries disagree"
                );
                self.metrics.record_unknown(&function_name);
                return JobOutcome::new(queue, Some(function_name), started, Err(err));
            }
        };

        debug!(
            function = %function_name,
            origin = %envelope.origin_name(),
            lag_ms = envelope.lag_ms(),
            "executing job"
        );

        let invocation = function.invoke(self.context.clone(), envelope.into_args());
        let result = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(JobError::permanent(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(()) => {
                info!(function = %function_name, ?elapsed, "job completed");
                self.metrics.record_completed(&function_name, elapsed);
            }
            Err(err) if err.is_retryable() => {
                warn!(function = %function_name, ?elapsed, error = %err, "job failed, retryable");
                self.metrics.record_failed(&function_name, elapsed, true);
            }
            Err(err) => {
                error!(function = %function_name, ?elapsed, error = %err, "job failed permanently");
                self.metrics.record_failed(&function_name, elapsed, false);
            }
        }

        JobOutcome {
            queue: queue.clone(),
            function_name: Some(function_name),
            elapsed,
            result: result.map_err(DispatchError::JobFailed),
        }
    }

    /// Like [`run`](Self::run), keeping only the result
    pub async fn execute(&self, queue: &QueueName, raw: &[u8]) -> DispatchResult<()> {
        self.run(queue, raw).await.result
    }
}

/// What happened to a single envelope
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub queue: QueueName,
    /// `None` when the envelope could not be decoded
    pub function_name: Option<String>,
    pub elapsed: Duration,
    pub result: DispatchResult<()>,
}

impl JobOutcome {
    fn new(
        queue: &QueueName,
        function_name: Option<String>,
        started: Instant,
        result: DispatchResult<()>,
    ) -> Self {
        Self {
            queue: queue.clone(),
            function_name,
            elapsed: started.elapsed(),
            result,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
