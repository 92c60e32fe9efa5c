pub mod registry;
pub mod stub;

pub use registry::{FunctionRegistry, RegisteredFunction};
pub use stub::JobStub;

use std::future::Future;

use async_trait::async_trait;

use crate::{JobArgs, JobError};

/// An asynchronous job handler invoked by name.
///
/// Any `Fn(C, JobArgs) -> impl Future<Output = Result<(), JobError>>`
/// qualifies, which covers plain `async fn`s:
///
/// ```
/// use dog_dispatch::{FunctionRegistry, JobArgs, JobError};
///
/// async fn resize(_ctx: (), args: JobArgs) -> Result<(), JobError> {
///     let _width = args.int(0)?;
///     Ok(())
/// }
///
/// let mut registry = FunctionRegistry::<()>::new();
/// registry.register("resize", resize).unwrap();
/// ```
///
/// A handler that cannot yield to the scheduler is rejected when the program
/// is compiled, before anything can be enqueued:
///
/// ```compile_fail
/// use dog_dispatch::{FunctionRegistry, JobArgs, JobError};
///
/// fn resize(_ctx: (), _args: JobArgs) -> Result<(), JobError> {
///     Ok(())
/// }
///
/// let mut registry = FunctionRegistry::<()>::new();
/// registry.register("resize", resize).unwrap();
/// ```
#[async_trait]
pub trait JobHandler<C>: Send + Sync + 'static {
    /// Run the job with the worker context and the decoded arguments
    async fn call(&self, ctx: C, args: JobArgs) -> Result<(), JobError>;
}

#[async_trait]
impl<C, F, Fut> JobHandler<C> for F
where
    C: Send + 'static,
    F: Fn(C, JobArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn call(&self, ctx: C, args: JobArgs) -> Result<(), JobError> {
        (self)(ctx, args).await
    }
}
