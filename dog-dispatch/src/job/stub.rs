use std::fmt;
use std::sync::Arc;

use crate::dispatcher::{Dispatcher, EnqueueRequest};
use crate::job::{JobHandler, RegisteredFunction};
use crate::{DispatchResult, JobArgs, QueueName};

/// Producer-side proxy returned by registration.
///
/// Calling through a stub only ever enqueues; the handler body runs wherever
/// the dispatcher's mode sends it. The real handler stays reachable through
/// [`original`](Self::original).
pub struct JobStub<C> {
    function: RegisteredFunction<C>,
}

impl<C> JobStub<C> {
    pub(crate) fn new(function: RegisteredFunction<C>) -> Self {
        Self { function }
    }
}

impl<C> JobStub<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn default_queue(&self) -> Option<&QueueName> {
        self.function.default_queue()
    }

    /// The registered handler itself
    pub fn original(&self) -> &Arc<dyn JobHandler<C>> {
        self.function.handler()
    }

    /// Enqueue on `queue_name`, falling back to the queue bound at registration
    pub async fn enqueue(
        &self,
        dispatcher: &Dispatcher<C>,
        args: JobArgs,
        queue_name: Option<QueueName>,
    ) -> DispatchResult<()> {
        let queue = queue_name.or_else(|| self.default_queue().cloned());
        dispatcher.enqueue(self.name(), args, queue).await
    }

    /// Build a call argument by argument
    pub fn call<'a>(&self, dispatcher: &'a Dispatcher<C>) -> EnqueueRequest<'a, C> {
        dispatcher
            .job(self.name())
            .queue_opt(self.default_queue().cloned())
    }
}

impl<C> Clone for JobStub<C> {
    fn clone(&self) -> Self {
        Self {
            function: self.function.clone(),
        }
    }
}

impl<C> fmt::Debug for JobStub<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JobStub").field(&self.function).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::job::FunctionRegistry;
    use crate::{Envelope, ExecutionMode, JobError, ModeSelector, Value};
    use parking_lot::Mutex;

    type Calls = Arc<Mutex<u32>>;

    async fn count(calls: Calls, _args: JobArgs) -> Result<(), JobError> {
        *calls.lock() += 1;
        Ok(())
    }

    #[tokio::test]
    async fn test_stub_enqueues_without_running() {
        let mut registry = FunctionRegistry::new();
        let stub = registry.register_on(QueueName::HIGH, "count", count).unwrap();

        let broker = MemoryBroker::new();
        let calls = Calls::default();
        let dispatcher = Dispatcher::new(registry.into_shared(), calls.clone(), Arc::new(broker.clone()));

        stub.enqueue(&dispatcher, JobArgs::new().arg(1), None).await.unwrap();
        stub.call(&dispatcher).kwarg("k", "v").send().await.unwrap();
        stub.call(&dispatcher).queue(QueueName::LOW).send().await.unwrap();

        assert_eq!(*calls.lock(), 0);
        assert_eq!(broker.len(&QueueName::HIGH), 2);
        assert_eq!(broker.len(&QueueName::LOW), 1);

        let payload = broker.drain(&QueueName::HIGH).remove(0);
        let envelope = Envelope::decode(&payload).unwrap();
        assert_eq!(envelope.function_name(), "count");
        assert_eq!(envelope.args(), &[Value::Int(1)]);
    }

    #[tokio::test]
    async fn test_original_runs_handler() {
        let mut registry = FunctionRegistry::new();
        let stub = registry.register("count", count).unwrap();
        let calls = Calls::default();

        stub.original().call(calls.clone(), JobArgs::new()).await.unwrap();
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_direct_mode_through_stub() {
        let mut registry = FunctionRegistry::new();
        let stub = registry.register("count", count).unwrap();
        let calls = Calls::default();
        let dispatcher = Dispatcher::new(registry.into_shared(), calls.clone(), Arc::new(MemoryBroker::new()))
            .with_mode(ModeSelector::new(ExecutionMode::Direct));

        stub.enqueue(&dispatcher, JobArgs::new(), None).await.unwrap();
        assert_eq!(*calls.lock(), 1);
    }
}
