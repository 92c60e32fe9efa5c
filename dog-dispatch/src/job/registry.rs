use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::job::{JobHandler, JobStub};
use crate::{DispatchError, DispatchResult, JobArgs, JobError, QueueName};

/// A handler registered under a name, with its optional default queue
pub struct RegisteredFunction<C> {
    name: Arc<str>,
    default_queue: Option<QueueName>,
    handler: Arc<dyn JobHandler<C>>,
}

impl<C: Send + 'static> RegisteredFunction<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue bound at registration, used when the caller names none
    pub fn default_queue(&self) -> Option<&QueueName> {
        self.default_queue.as_ref()
    }

    /// The real implementation (never the enqueuing stub)
    pub fn handler(&self) -> &Arc<dyn JobHandler<C>> {
        &self.handler
    }

    pub async fn invoke(&self, ctx: C, args: JobArgs) -> Result<(), JobError> {
        self.handler.call(ctx, args).await
    }
}

impl<C> Clone for RegisteredFunction<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            default_queue: self.default_queue.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<C> fmt::Debug for RegisteredFunction<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("name", &self.name)
            .field("default_queue", &self.default_queue)
            .finish_non_exhaustive()
    }
}

/// Name → handler table shared by producers and workers.
///
/// Built once at startup, then wrapped in an `Arc` and never mutated.
/// Producer and worker processes must register the same names or workers
/// will reject envelopes with [`DispatchError::UnknownFunction`].
pub struct FunctionRegistry<C> {
    functions: HashMap<String, RegisteredFunction<C>>,
}

impl<C: Send + 'static> FunctionRegistry<C> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Register an async function with no default queue
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F) -> DispatchResult<JobStub<C>>
    where
        F: Fn(C, JobArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        self.register_handler(name, None, handler)
    }

    /// Register an async function whose jobs go to `queue` unless the caller overrides it
    pub fn register_on<F, Fut>(
        &mut self,
        queue: impl Into<QueueName>,
        name: impl Into<String>,
        handler: F,
    ) -> DispatchResult<JobStub<C>>
    where
        F: Fn(C, JobArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        self.register_handler(name, Some(queue.into()), handler)
    }

    /// Register any [`JobHandler`] implementation
    pub fn register_handler<H>(
        &mut self,
        name: impl Into<String>,
        default_queue: Option<QueueName>,
        handler: H,
    ) -> DispatchResult<JobStub<C>>
    where
        H: JobHandler<C>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DispatchError::InvalidRegistration(
                "function name must not be empty".to_string(),
            ));
        }
        if self.functions.contains_key(&name) {
            return Err(DispatchError::DuplicateFunction(name));
        }

        debug!(
            function = %name,
            default_queue = ?default_queue.as_ref().map(QueueName::as_str),
            "registering function"
        );

        let function = RegisteredFunction {
            name: Arc::from(name.as_str()),
            default_queue,
            handler: Arc::new(handler),
        };
        self.functions.insert(name, function.clone());
        Ok(JobStub::new(function))
    }

    /// Look up a function by exact name
    pub fn get(&self, name: &str) -> Option<&RegisteredFunction<C>> {
        self.functions.get(name)
    }

    /// Look up a function, failing with `UnknownFunction` on a miss
    pub fn resolve(&self, name: &str) -> DispatchResult<&RegisteredFunction<C>> {
        self.get(name)
            .ok_or_else(|| DispatchError::UnknownFunction(name.to_string()))
    }

    /// Default queue bound to `name`, if any
    pub fn default_queue(&self, name: &str) -> Option<&QueueName> {
        self.get(name).and_then(RegisteredFunction::default_queue)
    }

    /// Check if a function is registered
    pub fn is_registered(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// All registered names, sorted
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Freeze the registry for sharing between dispatchers and workers
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl<C: Send + 'static> Default for FunctionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for FunctionRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    type Seen = Arc<Mutex<Vec<i64>>>;

    async fn record(seen: Seen, args: JobArgs) -> Result<(), JobError> {
        seen.lock().push(args.int(0)?);
        Ok(())
    }

    async fn noop(_ctx: Seen, _args: JobArgs) -> Result<(), JobError> {
        Ok(())
    }

    struct Rejecting;

    #[async_trait::async_trait]
    impl JobHandler<Seen> for Rejecting {
        async fn call(&self, _ctx: Seen, _args: JobArgs) -> Result<(), JobError> {
            Err(JobError::permanent("rejected"))
        }
    }

    #[tokio::test]
    async fn test_function_registry() {
        let mut registry = FunctionRegistry::<Seen>::new();

        registry.register("record", record).unwrap();
        registry.register_on(QueueName::LOW, "noop", noop).unwrap();

        assert!(registry.is_registered("record"));
        assert_eq!(registry.registered_names(), vec!["noop", "record"]);
        assert_eq!(registry.default_queue("noop"), Some(&QueueName::LOW));
        assert_eq!(registry.default_queue("record"), None);

        let seen = Seen::default();
        registry
            .resolve("record")
            .unwrap()
            .invoke(seen.clone(), JobArgs::new().arg(5))
            .await
            .unwrap();
        assert_eq!(*seen.lock(), vec![5]);
    }

    #[tokio::test]
    async fn test_trait_handlers() {
        let mut registry = FunctionRegistry::<Seen>::new();
        registry.register_handler("reject", None, Rejecting).unwrap();

        let result = registry
            .get("reject")
            .unwrap()
            .invoke(Seen::default(), JobArgs::new())
            .await;
        assert_eq!(result, Err(JobError::permanent("rejected")));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = FunctionRegistry::<Seen>::new();
        registry.register("noop", noop).unwrap();

        let err = registry.register("noop", noop).unwrap_err();
        assert_eq!(err, DispatchError::DuplicateFunction("noop".to_string()));
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = FunctionRegistry::<Seen>::new();
        let err = registry.register("  ", noop).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRegistration(_)));
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::<Seen>::new();
        let err = registry.resolve("missing").unwrap_err();
        assert_eq!(err, DispatchError::UnknownFunction("missing".to_string()));
    }
}
