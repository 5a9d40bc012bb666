//! Running one test body
//!
//! Resolves the given chain, runs the body, then the after-each callbacks
//! and, for isolated tests, the scope's closers. A failing body wins over
//! failing cleanup; cleanup failures only surface when the body succeeded.

use crate::outcome::{catch_future, panic_message, IntoOutcome};
use crate::resources::ResourceScope;
use futures::future::BoxFuture;
use futures::FutureExt;
use nestrun_core::{FailureCause, TestDescription, TestResult};
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Producer of the value handed to every test of a context.
pub(crate) type GivenFn<G> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<G>> + Send + Sync>;

/// The given chain of a root context.
pub(crate) fn unit_given() -> GivenFn<()> {
    Arc::new(|| futures::future::ready(Ok::<(), anyhow::Error>(())).boxed())
}

/// Extend `parent` with one more producer.
pub(crate) fn chain_given<G, C, P, Fut, E>(parent: GivenFn<G>, producer: P) -> GivenFn<C>
where
    G: Send + 'static,
    C: Send + 'static,
    P: Fn(G) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
{
    let producer = Arc::new(producer);
    Arc::new(move || {
        let parent = Arc::clone(&parent);
        let producer = Arc::clone(&producer);
        async move {
            let given = parent().await?;
            let value = producer(given).await.map_err(Into::<anyhow::Error>::into)?;
            Ok::<C, anyhow::Error>(value)
        }
        .boxed()
    })
}

/// Handle passed to every test body.
#[derive(Clone)]
pub struct TestContext {
    test: TestDescription,
    scope: Arc<ResourceScope>,
}

impl TestContext {
    pub(crate) fn new(test: TestDescription, scope: Arc<ResourceScope>) -> Self {
        Self { test, scope }
    }

    /// The running test.
    pub fn test(&self) -> &TestDescription {
        &self.test
    }

    /// Register a resource that is closed together with the test's scope.
    pub fn auto_close<R, F, O>(&self, resource: R, closer: F) -> Arc<R>
    where
        R: Send + Sync + 'static,
        F: FnOnce(&R) -> O + Send + 'static,
        O: IntoOutcome,
    {
        self.scope.auto_close(resource, closer)
    }

    /// Log a message attributed to the running test.
    pub fn log(&self, message: impl fmt::Display) {
        info!(target: "nestrun::test", test = %self.test, "{}", message);
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext").field("test", &self.test.to_string()).finish()
    }
}

/// Execute one test and produce its result.
///
/// `close_resources` is set for isolated tests, which own their scope for
/// the duration of the test. Shared scopes are closed when the suite ends.
pub(crate) async fn run_test<G, F, Fut, R>(
    test: TestDescription,
    given: GivenFn<G>,
    body: F,
    scope: Arc<ResourceScope>,
    close_resources: bool,
) -> TestResult
where
    G: Send + 'static,
    F: FnOnce(TestContext, G) -> Fut + Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome,
{
    let start = Instant::now();
    let context = TestContext::new(test.clone(), Arc::clone(&scope));

    let outcome = match AssertUnwindSafe(given()).catch_unwind().await {
        Ok(Ok(value)) => match catch_unwind(AssertUnwindSafe(|| body(context, value))) {
            Ok(future) => catch_future(future).await,
            Err(payload) => Err(FailureCause::Panic(panic_message(payload.as_ref()))),
        },
        Ok(Err(error)) => Err(FailureCause::from(error)),
        Err(payload) => Err(FailureCause::Panic(panic_message(payload.as_ref()))),
    };

    let result = match outcome {
        Ok(()) => TestResult::Success {
            elapsed_micros: start.elapsed().as_micros() as u64,
        },
        Err(cause) => TestResult::failure(cause),
    };

    let after_each = scope.call_after_each(&test, &result).await;
    let closed = if close_resources {
        scope.close_auto_closeables()
    } else {
        Ok(())
    };

    if result.is_failure() {
        return result;
    }
    match after_each.and(closed) {
        Ok(()) => result,
        Err(cause) => TestResult::failure(cause),
    }
}

/// A callback that runs once after every test of the suite has finished.
pub(crate) type AfterSuiteFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), FailureCause>> + Send>;

pub(crate) fn after_suite_fn<F, Fut, R>(callback: F) -> AfterSuiteFn
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + 'static,
{
    Box::new(move || {
        async move {
            match catch_unwind(AssertUnwindSafe(callback)) {
                Ok(future) => catch_future(future).await,
                Err(payload) => Err(FailureCause::Panic(panic_message(payload.as_ref()))),
            }
        }
        .boxed()
    })
}
