//! Worker loop: fetch from the broker, run through the executor, repeat.
//!
//! Each cycle waits for a free job slot, then blocks on the broker for at
//! most `poll_timeout`. A fetch is never cancelled once started, since a
//! destructive pop abandoned halfway could lose the envelope; shutdown is
//! observed between polls instead.

mod backoff;

use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub use backoff::backoff_delay;

use crate::{
    broker::{Broker, Delivery},
    config::WorkerConfig,
    execution::{JobExecutor, JobOutcome},
    job::FunctionRegistry,
    observability::LiveMetrics,
    DispatchError, DispatchResult, QueueName,
};

/// Pulls envelopes from a broker and executes them
pub struct Worker<C> {
    id: String,
    executor: JobExecutor<C>,
    broker: Arc<dyn Broker>,
    config: WorkerConfig,
}

impl<C> Worker<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn new(registry: Arc<FunctionRegistry<C>>, context: C, broker: Arc<dyn Broker>) -> Self {
        Self::with_config(registry, context, broker, WorkerConfig::default())
    }

    pub fn with_config(
        registry: Arc<FunctionRegistry<C>>,
        context: C,
        broker: Arc<dyn Broker>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id: format!("worker-{}", Uuid::new_v4()),
            executor: JobExecutor::new(registry, context),
            broker,
            config,
        }
    }

    /// Share a metrics collector, e.g. with a dispatcher in the same process
    pub fn with_metrics(mut self, metrics: Arc<LiveMetrics>) -> Self {
        self.executor = self.executor.with_metrics(metrics);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<LiveMetrics> {
        self.executor.metrics()
    }

    /// Run one raw envelope as if it had been popped from `queue`
    pub async fn process(&self, queue: &QueueName, raw: &[u8]) -> JobOutcome {
        self.executor.run(queue, raw).await
    }

    /// Fetch at most one envelope and run it inline.
    ///
    /// `Ok(None)` when every queue stayed empty for the poll timeout.
    pub async fn poll_once(&self) -> DispatchResult<Option<JobOutcome>> {
        match self.fetch().await? {
            Some(delivery) => Ok(Some(self.process(&delivery.queue, &delivery.payload).await)),
            None => Ok(None),
        }
    }

    /// Spawn the loop on the runtime
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let id = self.id.clone();
        let join_handle = tokio::spawn(self.run(shutdown_rx));

        info!(worker_id = %id, "started worker");
        WorkerHandle {
            id,
            shutdown_tx,
            join_handle,
        }
    }

    /// Run until `shutdown` turns true (or its sender is dropped), then wait
    /// for in-flight jobs to finish
    #[instrument(skip_all, fields(worker_id = %self.id))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let slots = Arc::new(Semaphore::new(self.config.max_jobs.max(1)));
        let mut running: JoinSet<JobOutcome> = JoinSet::new();
        let mut failures: u32 = 0;

        info!(
            queues = ?self.config.queues,
            max_jobs = self.config.max_jobs,
            broker = self.broker.name(),
            "worker loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            while let Some(joined) = running.try_join_next() {
                log_joined(joined);
            }

            let permit = tokio::select! {
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            match self.fetch().await {
                Ok(Some(delivery)) => {
                    failures = 0;
                    debug!(queue = %delivery.queue, bytes = delivery.payload.len(), "fetched envelope");

                    let executor = self.executor.clone();
                    running.spawn(async move {
                        let _permit = permit;
                        executor.run(&delivery.queue, &delivery.payload).await
                    });
                }
                Ok(None) => {
                    failures = 0;
                }
                Err(err) => {
                    drop(permit);
                    failures = failures.saturating_add(1);
                    self.metrics().record_broker_error();

                    let delay = backoff_delay(failures, self.config.base_backoff, self.config.max_backoff);
                    warn!(error = %err, attempt = failures, ?delay, "fetch failed, backing off");

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        info!(in_flight = running.len(), "worker stopping, draining in-flight jobs");
        while let Some(joined) = running.join_next().await {
            log_joined(joined);
        }
        info!("worker stopped");
    }

    async fn fetch(&self) -> DispatchResult<Option<Delivery>> {
        let mut conn = self.broker.acquire().await?;
        conn.pop(&self.config.queues, self.config.poll_timeout).await
    }
}

fn log_joined(joined: Result<JobOutcome, JoinError>) {
    if let Err(err) = joined {
        error!(error = %err, "job task did not complete");
    }
}

/// Handle to a spawned worker loop
pub struct WorkerHandle {
    id: String,
    shutdown_tx: watch::Sender<bool>,
    join_handle: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Stop fetching, wait for in-flight jobs, and join the loop
    pub async fn shutdown(self) -> DispatchResult<()> {
        let _ = self.shutdown_tx.send(true);
        self.join_handle
            .await
            .map_err(|e| DispatchError::Internal(format!("Worker join error: {}", e)))
    }
}
