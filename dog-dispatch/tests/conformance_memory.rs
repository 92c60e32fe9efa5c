use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use dog_dispatch::broker::MemoryBroker;
use dog_dispatch::prelude::*;
use dog_dispatch::{Envelope, JobOutcome, LiveMetrics};

/// Calls observed by handlers: (function, positional ints, kwarg "x")
type Calls = Arc<Mutex<Vec<(String, Vec<i64>, Option<i64>)>>>;

#[derive(Clone, Default)]
struct TestContext {
    calls: Calls,
}

impl TestContext {
    fn record(&self, function: &str, args: &JobArgs) -> Result<(), JobError> {
        let ints = args
            .args
            .iter()
            .map(|v| v.as_i64().ok_or_else(|| JobError::permanent("expected ints")))
            .collect::<Result<Vec<_>, _>>()?;
        let x = args.keyword("x").and_then(Value::as_i64);
        self.calls.lock().push((function.to_string(), ints, x));
        Ok(())
    }

    fn calls(&self) -> Vec<(String, Vec<i64>, Option<i64>)> {
        self.calls.lock().clone()
    }
}

async fn f(ctx: TestContext, args: JobArgs) -> Result<(), JobError> {
    ctx.record("f", &args)
}

async fn g(ctx: TestContext, args: JobArgs) -> Result<(), JobError> {
    ctx.record("g", &args)
}

async fn fails(_ctx: TestContext, _args: JobArgs) -> Result<(), JobError> {
    Err(JobError::permanent("card declined"))
}

async fn slow(ctx: TestContext, args: JobArgs) -> Result<(), JobError> {
    tokio::time::sleep(Duration::from_millis(40)).await;
    ctx.record("slow", &args)
}

/// Test factory functions
fn create_registry() -> Arc<FunctionRegistry<TestContext>> {
    let mut registry = FunctionRegistry::new();
    registry.register("f", f).unwrap();
    registry.register_on(QueueName::LOW, "g", g).unwrap();
    registry.register("fails", fails).unwrap();
    registry.register("slow", slow).unwrap();
    registry.into_shared()
}

fn create_dispatcher(mode: ExecutionMode) -> (Dispatcher<TestContext>, MemoryBroker, TestContext) {
    let broker = MemoryBroker::new();
    let ctx = TestContext::default();
    let dispatcher = Dispatcher::new(create_registry(), ctx.clone(), Arc::new(broker.clone()))
        .with_mode(ModeSelector::new(mode))
        .with_origin_name("conformance");
    (dispatcher, broker, ctx)
}

fn create_worker(broker: &MemoryBroker, ctx: &TestContext) -> Worker<TestContext> {
    let config = WorkerConfig::default()
        .with_poll_timeout(Duration::from_millis(20))
        .with_max_jobs(4);
    Worker::with_config(create_registry(), ctx.clone(), Arc::new(broker.clone()), config)
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Direct mode runs the handler before enqueue returns
#[tokio::test]
async fn test_direct_mode_executes_inline() {
    let (dispatcher, broker, ctx) = create_dispatcher(ExecutionMode::Direct);

    dispatcher
        .job("f")
        .arg(1)
        .arg(2)
        .kwarg("x", 3)
        .send()
        .await
        .unwrap();

    assert_eq!(ctx.calls(), vec![("f".to_string(), vec![1, 2], Some(3))]);
    assert_eq!(broker.total_len(), 0);
}

/// Direct mode hands the handler's failure back to the caller
#[tokio::test]
async fn test_direct_mode_propagates_failure() {
    let (dispatcher, _, _) = create_dispatcher(ExecutionMode::Direct);

    let err = dispatcher.job("fails").send().await.unwrap_err();
    assert_eq!(err, DispatchError::JobFailed(JobError::permanent("card declined")));

    let err = dispatcher.job("missing").send().await.unwrap_err();
    assert_eq!(err, DispatchError::UnknownFunction("missing".to_string()));
}

/// Queued mode pushes one decodable envelope to the default queue
#[tokio::test]
async fn test_queued_mode_pushes_envelope() {
    let (dispatcher, broker, ctx) = create_dispatcher(ExecutionMode::Queued);

    dispatcher
        .enqueue("f", JobArgs::new().arg(1).arg(2).kwarg("x", 3), None)
        .await
        .unwrap();

    assert!(ctx.calls().is_empty());
    let pushed = broker.drain(&QueueName::DEFAULT);
    assert_eq!(pushed.len(), 1);
    assert_eq!(broker.total_len(), 0);

    let envelope = Envelope::decode(&pushed[0]).unwrap();
    assert_eq!(envelope.function_name(), "f");
    assert_eq!(envelope.origin_name(), "conformance");
    assert_eq!(envelope.args(), &[Value::Int(1), Value::Int(2)]);
    assert_eq!(envelope.kwargs().get("x"), Some(&Value::Int(3)));
    assert!(envelope.lag_ms() >= 0);
}

/// Explicit queue beats the registered default, which beats the global default
#[tokio::test]
async fn test_queue_resolution_precedence() {
    let (dispatcher, broker, _) = create_dispatcher(ExecutionMode::Queued);

    dispatcher.enqueue("g", JobArgs::new(), None).await.unwrap();
    assert_eq!(broker.len(&QueueName::LOW), 1);

    dispatcher
        .enqueue("g", JobArgs::new(), Some(QueueName::HIGH))
        .await
        .unwrap();
    assert_eq!(broker.len(&QueueName::HIGH), 1);

    dispatcher.enqueue("f", JobArgs::new(), None).await.unwrap();
    assert_eq!(broker.len(&QueueName::DEFAULT), 1);
    assert_eq!(broker.total_len(), 3);
}

/// Broker outages surface to the producer and never leak pooled connections
#[tokio::test]
async fn test_broker_unavailable_surfaces() {
    let (dispatcher, broker, _) = create_dispatcher(ExecutionMode::Queued);
    broker.set_available(false);

    let err = dispatcher.enqueue("f", JobArgs::new(), None).await.unwrap_err();
    assert!(matches!(err, DispatchError::BrokerUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(broker.connections_in_use(), 0);
    assert_eq!(dispatcher.metrics().broker_errors(), 1);

    broker.set_available(true);
    dispatcher.enqueue("f", JobArgs::new(), None).await.unwrap();
    assert_eq!(broker.connections_in_use(), 0);
}

/// close() waits for every scheduled task
#[tokio::test]
async fn test_close_waits_for_scheduled_tasks() {
    let (dispatcher, _, ctx) = create_dispatcher(ExecutionMode::Scheduled);

    for i in 0..5 {
        dispatcher.job("slow").arg(i).send().await.unwrap();
    }
    assert!(ctx.calls().is_empty());

    dispatcher.close().await;

    let mut seen: Vec<i64> = ctx.calls().into_iter().flat_map(|(_, ints, _)| ints).collect();
    seen.sort();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    assert_eq!(dispatcher.in_flight(), 0);

    let err = dispatcher.job("slow").send().await.unwrap_err();
    assert_eq!(err, DispatchError::Closed);
}

/// Scheduled failures are logged, not returned
#[tokio::test]
async fn test_scheduled_failure_does_not_reach_caller() {
    let (dispatcher, _, _) = create_dispatcher(ExecutionMode::Scheduled);

    dispatcher.job("fails").send().await.unwrap();
    dispatcher.job("missing").send().await.unwrap();
    dispatcher.close().await;

    let metrics = dispatcher.metrics().snapshot();
    assert_eq!(metrics.jobs_failed, 1);
    assert_eq!(metrics.functions_unknown, 1);
}

/// An unknown function does not stop the loop
#[tokio::test]
async fn test_worker_survives_unknown_function() {
    let broker = MemoryBroker::new();
    let ctx = TestContext::default();
    let worker = create_worker(&broker, &ctx);
    let metrics = worker.metrics().clone();

    let unknown = Envelope::new("old-deploy", "renamed_job", JobArgs::new()).encode().unwrap();
    let known = Envelope::new("new-deploy", "f", JobArgs::new().arg(9)).encode().unwrap();
    broker.push_raw(&QueueName::DEFAULT, unknown);
    broker.push_raw(&QueueName::DEFAULT, b"\xc1 not msgpack".to_vec());
    broker.push_raw(&QueueName::DEFAULT, known);

    let handle = worker.start();
    wait_until(|| !ctx.calls().is_empty()).await;
    handle.shutdown().await.unwrap();

    assert_eq!(ctx.calls(), vec![("f".to_string(), vec![9], None)]);
    assert_eq!(metrics.functions_unknown(), 1);
    assert_eq!(metrics.envelopes_malformed(), 1);
    assert_eq!(broker.total_len(), 0);
}

/// process() reports each failure kind
#[tokio::test]
async fn test_worker_process_outcomes() {
    let broker = MemoryBroker::new();
    let ctx = TestContext::default();
    let worker = create_worker(&broker, &ctx);

    let outcome: JobOutcome = worker
        .process(
            &QueueName::DEFAULT,
            &Envelope::new("p", "ghost", JobArgs::new()).encode().unwrap(),
        )
        .await;
    assert_eq!(outcome.result, Err(DispatchError::UnknownFunction("ghost".to_string())));
    assert!(!outcome.result.as_ref().unwrap_err().is_retryable());

    let outcome = worker.process(&QueueName::DEFAULT, &[0x95]).await;
    assert!(matches!(outcome.result, Err(DispatchError::MalformedEnvelope(_))));

    let outcome = worker
        .process(
            &QueueName::DEFAULT,
            &Envelope::new("p", "fails", JobArgs::new()).encode().unwrap(),
        )
        .await;
    assert_eq!(outcome.function_name.as_deref(), Some("fails"));
    assert!(!outcome.is_success());
}

/// High is drained before default before low
#[tokio::test]
async fn test_worker_drains_in_priority_order() {
    let broker = MemoryBroker::new();
    let ctx = TestContext::default();
    let worker = create_worker(&broker, &ctx);

    for (queue, value) in [(QueueName::LOW, 3), (QueueName::DEFAULT, 2), (QueueName::HIGH, 1)] {
        let raw = Envelope::new("p", "f", JobArgs::new().arg(value)).encode().unwrap();
        broker.push_raw(&queue, raw);
    }

    let mut order = Vec::new();
    while let Some(outcome) = worker.poll_once().await.unwrap() {
        order.push(outcome.queue);
    }

    assert_eq!(order, QueueName::defaults());
    let seen: Vec<i64> = ctx.calls().into_iter().flat_map(|(_, ints, _)| ints).collect();
    assert_eq!(seen, vec![1, 2, 3]);
}

/// Dispatcher and worker share one process and one metrics collector
#[tokio::test]
async fn test_end_to_end_queued() {
    let broker = MemoryBroker::new();
    let ctx = TestContext::default();
    let metrics = Arc::new(LiveMetrics::new());

    let registry = create_registry();
    let dispatcher = Dispatcher::new(registry.clone(), ctx.clone(), Arc::new(broker.clone()))
        .with_metrics(metrics.clone());
    let worker = create_worker(&broker, &ctx).with_metrics(metrics.clone());
    let handle = worker.start();

    for i in 0..10 {
        dispatcher.job("f").arg(i).send().await.unwrap();
    }

    wait_until(|| ctx.calls().len() == 10).await;
    handle.shutdown().await.unwrap();
    dispatcher.close().await;

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.jobs_enqueued, 10);
    assert_eq!(snapshot.jobs_completed, 10);
    assert_eq!(snapshot.functions["f"].completed, 10);
}

/// Flipping a shared selector reroutes every dispatcher built from it
#[tokio::test]
async fn test_shared_mode_selector() {
    let selector = ModeSelector::default();
    let broker = MemoryBroker::new();
    let ctx = TestContext::default();
    let dispatcher = Dispatcher::new(create_registry(), ctx.clone(), Arc::new(broker.clone()))
        .with_mode(selector.clone());

    dispatcher.job("f").arg(1).send().await.unwrap();
    assert_eq!(broker.len(&QueueName::DEFAULT), 1);

    selector.set_direct();
    dispatcher.job("f").arg(2).send().await.unwrap();
    assert_eq!(broker.len(&QueueName::DEFAULT), 1);
    assert_eq!(ctx.calls().len(), 1);
}
