//! Resource scopes
//!
//! A scope collects cleanup closers and after-each callbacks registered by
//! context bodies and test bodies. Closers run LIFO; every closer and every
//! callback runs even when an earlier one fails, and the first failure is
//! the one reported.

use crate::outcome::{catch_body, catch_future, IntoOutcome};
use futures::future::BoxFuture;
use futures::FutureExt;
use nestrun_core::{FailureCause, TestDescription, TestResult};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

type Closer = Box<dyn FnOnce() -> Result<(), FailureCause> + Send>;
type AfterEach =
    Arc<dyn Fn(TestDescription, TestResult) -> BoxFuture<'static, Result<(), FailureCause>> + Send + Sync>;

/// Registry of cleanups owned by one branch or one isolated test.
#[derive(Default)]
pub struct ResourceScope {
    closers: Mutex<Vec<Closer>>,
    after_each: Mutex<Vec<AfterEach>>,
}

impl ResourceScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resource` and the closer that releases it.
    ///
    /// The resource is shared with the closer, which receives a reference to
    /// it when the scope is closed.
    pub fn auto_close<R, F, O>(&self, resource: R, closer: F) -> Arc<R>
    where
        R: Send + Sync + 'static,
        F: FnOnce(&R) -> O + Send + 'static,
        O: IntoOutcome,
    {
        let resource = Arc::new(resource);
        let handle = Arc::clone(&resource);
        self.closers
            .lock()
            .push(Box::new(move || catch_body(|| closer(&handle))));
        resource
    }

    /// Register a callback that runs after every test using this scope.
    pub fn after_each<F, Fut, O>(&self, callback: F)
    where
        F: Fn(TestDescription, TestResult) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
        O: IntoOutcome + 'static,
    {
        let callback: AfterEach = Arc::new(move |test: TestDescription, result: TestResult| {
            catch_future(callback(test, result)).boxed()
        });
        self.after_each.lock().push(callback);
    }

    /// Number of closers that have not run yet.
    pub fn pending_closers(&self) -> usize {
        self.closers.lock().len()
    }

    /// Run every registered closer in reverse registration order.
    ///
    /// Closers are removed from the scope, so a second call is a no-op.
    pub fn close_auto_closeables(&self) -> Result<(), FailureCause> {
        let closers = std::mem::take(&mut *self.closers.lock());
        let mut first_failure = None;
        for closer in closers.into_iter().rev() {
            if let Err(cause) = closer() {
                debug!(target: "nestrun::resources", error = %cause, "closer failed");
                first_failure.get_or_insert(cause);
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    /// Run every after-each callback with the test and its result.
    pub async fn call_after_each(
        &self,
        test: &TestDescription,
        result: &TestResult,
    ) -> Result<(), FailureCause> {
        let callbacks = self.after_each.lock().clone();
        let mut first_failure = None;
        for callback in callbacks {
            if let Err(cause) = callback(test.clone(), result.clone()).await {
                debug!(target: "nestrun::resources", test = %test, error = %cause, "after-each callback failed");
                first_failure.get_or_insert(cause);
            }
        }
        first_failure.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceScope")
            .field("closers", &self.closers.lock().len())
            .field("after_each", &self.after_each.lock().len())
            .finish()
    }
}
