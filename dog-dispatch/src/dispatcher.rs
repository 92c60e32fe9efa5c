use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    broker::Broker,
    config::DispatchConfig,
    execution::JobExecutor,
    job::FunctionRegistry,
    mode::{ExecutionMode, ModeSelector},
    observability::LiveMetrics,
    DispatchError, DispatchResult, Envelope, JobArgs, QueueName, Value,
};

/// Default origin recorded in envelopes
pub const DEFAULT_ORIGIN: &str = "dog-dispatch";

/// Producer-side entry point.
///
/// `enqueue` routes a call by the current [`ExecutionMode`]: inline
/// (`Direct`), on a tracked background task (`Scheduled`), or onto the broker
/// for a worker (`Queued`). After [`close`](Self::close) every enqueue fails
/// with [`DispatchError::Closed`].
pub struct Dispatcher<C> {
    origin_name: String,
    mode: ModeSelector,
    executor: JobExecutor<C>,
    broker: Arc<dyn Broker>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<C> Dispatcher<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Create a dispatcher in the default (queued) mode
    pub fn new(registry: Arc<FunctionRegistry<C>>, context: C, broker: Arc<dyn Broker>) -> Self {
        Self {
            origin_name: DEFAULT_ORIGIN.to_string(),
            mode: ModeSelector::default(),
            executor: JobExecutor::new(registry, context),
            broker,
            in_flight: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a dispatcher with the mode and origin from `config`
    pub fn from_config(
        config: &DispatchConfig,
        registry: Arc<FunctionRegistry<C>>,
        context: C,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self::new(registry, context, broker)
            .with_mode(ModeSelector::new(config.mode))
            .with_origin_name(config.origin_name.clone())
    }

    /// Use a shared mode selector
    pub fn with_mode(mut self, mode: ModeSelector) -> Self {
        self.mode = mode;
        self
    }

    /// Name stamped into every envelope as the producer identity
    pub fn with_origin_name(mut self, origin_name: impl Into<String>) -> Self {
        self.origin_name = origin_name.into();
        self
    }

    /// Share a metrics collector, e.g. with a worker in the same process
    pub fn with_metrics(mut self, metrics: Arc<LiveMetrics>) -> Self {
        self.executor = self.executor.with_metrics(metrics);
        self
    }

    pub fn mode(&self) -> &ModeSelector {
        &self.mode
    }

    pub fn origin_name(&self) -> &str {
        &self.origin_name
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry<C>> {
        self.executor.registry()
    }

    pub fn metrics(&self) -> &Arc<LiveMetrics> {
        self.executor.metrics()
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Background tasks started in scheduled mode that have not finished yet
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Start building a call to `function_name`
    pub fn job(&self, function_name: impl Into<String>) -> EnqueueRequest<'_, C> {
        EnqueueRequest::new(self, function_name.into())
    }

    /// Enqueue a call to `function_name`.
    ///
    /// The queue is `queue` if given, else the function's registered default,
    /// else [`QueueName::DEFAULT`].
    #[instrument(skip(self, args), fields(mode = tracing::field::Empty))]
    pub async fn enqueue(
        &self,
        function_name: &str,
        args: JobArgs,
        queue: Option<QueueName>,
    ) -> DispatchResult<()> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }

        let queue = self.resolve_queue(function_name, queue);
        let envelope = Envelope::new(self.origin_name.as_str(), function_name, args);
        let payload = envelope.encode()?;

        let mode = self.mode.current();
        tracing::Span::current().record("mode", mode.name());
        debug!(queue = %queue, bytes = payload.len(), "routing job");

        match mode {
            ExecutionMode::Direct => {
                self.executor.execute(&queue, &payload).await?;
            }
            ExecutionMode::Scheduled => self.spawn_tracked(function_name, queue, payload)?,
            ExecutionMode::Queued => self.push(&queue, &payload).await?,
        }

        self.metrics().record_enqueued(function_name);
        Ok(())
    }

    /// Stop accepting jobs, wait for every scheduled task, then close the broker.
    ///
    /// Scheduled tasks are never cancelled; this waits as long as they take.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        {
            let _guard = self.in_flight.lock();
            self.closed.store(true, Ordering::Release);
        }

        loop {
            let handles = std::mem::take(&mut *self.in_flight.lock());
            if handles.is_empty() {
                break;
            }

            debug!(count = handles.len(), "waiting for scheduled jobs");
            for joined in join_all(handles).await {
                if let Err(err) = joined {
                    error!(error = %err, "scheduled job task did not complete");
                }
            }
        }

        self.broker.close().await;
        info!("dispatcher closed");
    }

    fn resolve_queue(&self, function_name: &str, queue: Option<QueueName>) -> QueueName {
        queue
            .or_else(|| self.registry().default_queue(function_name).cloned())
            .unwrap_or_default()
    }

    async fn push(&self, queue: &QueueName, payload: &[u8]) -> DispatchResult<()> {
        let mut conn = self.broker.acquire().await.map_err(|err| {
            self.metrics().record_broker_error();
            warn!(broker = self.broker.name(), error = %err, "could not acquire broker connection");
            err
        })?;

        conn.push(queue, payload).await.map_err(|err| {
            self.metrics().record_broker_error();
            warn!(broker = self.broker.name(), queue = %queue, error = %err, "push failed");
            err
        })
    }

    fn spawn_tracked(&self, function_name: &str, queue: QueueName, payload: Vec<u8>) -> DispatchResult<()> {
        let executor = self.executor.clone();
        let function_name = function_name.to_string();

        let mut in_flight = self.in_flight.lock();
        // close() flips the flag under this lock, so no task can slip past its drain
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        in_flight.retain(|handle| !handle.is_finished());

        in_flight.push(tokio::spawn(async move {
            if let Err(err) = executor.execute(&queue, &payload).await {
                error!(function = %function_name, queue = %queue, error = %err, "scheduled job failed");
            }
        }));
        Ok(())
    }
}

/// Builder returned by [`Dispatcher::job`] and [`JobStub::call`](crate::JobStub::call)
#[must_use = "nothing is enqueued until `send` is awaited"]
pub struct EnqueueRequest<'a, C> {
    dispatcher: &'a Dispatcher<C>,
    function_name: String,
    args: JobArgs,
    queue: Option<QueueName>,
}

impl<'a, C> EnqueueRequest<'a, C>
where
    C: Clone + Send + Sync + 'static,
{
    fn new(dispatcher: &'a Dispatcher<C>, function_name: String) -> Self {
        Self {
            dispatcher,
            function_name,
            args: JobArgs::new(),
            queue: None,
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args = self.args.arg(value);
        self
    }

    /// Set a keyword argument
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args = self.args.kwarg(key, value);
        self
    }

    /// Replace all arguments
    pub fn args(mut self, args: JobArgs) -> Self {
        self.args = args;
        self
    }

    /// Override the queue
    pub fn queue(mut self, queue: impl Into<QueueName>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub(crate) fn queue_opt(mut self, queue: Option<QueueName>) -> Self {
        self.queue = queue;
        self
    }

    pub async fn send(self) -> DispatchResult<()> {
        self.dispatcher
            .enqueue(&self.function_name, self.args, self.queue)
            .await
    }
}
