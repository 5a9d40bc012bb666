//! Execution scheduler and deferred results
//!
//! Every selected test becomes one unit of work. In eager mode the unit is
//! spawned on the tokio runtime right away; in lazy mode it runs when its
//! deferred result is first awaited. A semaphore bounds how many units run
//! at once, and each unit carries its own timeout.

use crate::resources::ResourceScope;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use nestrun_core::{ExecutionListener, FailureCause, TestDescription, TestPlusResult, TestResult};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, info_span, warn, Instrument};

// ============================================================================
// DeferredResult
// ============================================================================

/// Handle to the eventual result of one test.
///
/// Cloning is cheap and every clone resolves to the same result. The test
/// runs at most once no matter how many times the handle is awaited.
#[derive(Clone)]
pub struct DeferredResult {
    test: TestDescription,
    result: Shared<BoxFuture<'static, TestPlusResult>>,
    abort: Option<AbortHandle>,
}

impl DeferredResult {
    /// A result that is known at discovery time.
    pub(crate) fn ready(test: TestDescription, result: TestResult) -> Self {
        let resolved = TestPlusResult::new(test.clone(), result);
        Self {
            test,
            result: futures::future::ready(resolved).boxed().shared(),
            abort: None,
        }
    }

    /// The test this handle belongs to.
    pub fn test(&self) -> &TestDescription {
        &self.test
    }

    /// The result, if the test has already finished and been awaited.
    pub fn peek(&self) -> Option<&TestPlusResult> {
        self.result.peek()
    }

    /// Cancel the spawned unit, if any.
    pub(crate) fn abort(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }
}

impl Future for DeferredResult {
    type Output = TestPlusResult;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        self.get_mut().result.poll_unpin(cx)
    }
}

impl fmt::Debug for DeferredResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredResult")
            .field("test", &self.test.to_string())
            .field("finished", &self.peek().is_some())
            .finish()
    }
}

// ============================================================================
// TestScheduler
// ============================================================================

/// Launches test units and hands out deferred results.
pub(crate) struct TestScheduler {
    lazy: bool,
    timeout: Duration,
    permits: Arc<Semaphore>,
    listener: Arc<dyn ExecutionListener>,
}

impl TestScheduler {
    pub(crate) fn new(
        lazy: bool,
        timeout: Duration,
        parallelism: usize,
        listener: Arc<dyn ExecutionListener>,
    ) -> Self {
        Self {
            lazy,
            timeout,
            permits: Arc::new(Semaphore::new(parallelism.max(1))),
            listener,
        }
    }

    /// Schedule `unit` as the execution of `test`.
    ///
    /// When the timeout fires, `cleanup` is closed on behalf of the
    /// cancelled unit so an isolated test never leaks its resources.
    pub(crate) fn schedule(
        &self,
        test: TestDescription,
        unit: BoxFuture<'static, TestResult>,
        cleanup: Option<Arc<ResourceScope>>,
    ) -> DeferredResult {
        let span = info_span!(target: "nestrun::scheduler", "test", test = %test);
        let permits = Arc::clone(&self.permits);
        let listener = Arc::clone(&self.listener);
        let timeout = self.timeout;
        let description = test.clone();

        let run = async move {
            // the semaphore is never closed
            let _permit = permits.acquire_owned().await.ok();
            listener.test_started(&description);
            let result = match tokio::time::timeout(timeout, unit).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(target: "nestrun::scheduler", timeout_ms = timeout.as_millis() as u64, "test timed out");
                    if let Some(scope) = cleanup {
                        if let Err(cause) = scope.close_auto_closeables() {
                            warn!(target: "nestrun::scheduler", error = %cause, "cleanup after timeout failed");
                        }
                    }
                    TestResult::failure(FailureCause::Timeout(timeout))
                }
            };
            listener.test_finished(&description, &result);
            TestPlusResult::new(description, result)
        }
        .instrument(span);

        if self.lazy {
            return DeferredResult {
                test,
                result: run.boxed().shared(),
                abort: None,
            };
        }

        match Handle::try_current() {
            Ok(handle) => {
                let join = handle.spawn(run);
                let abort = join.abort_handle();
                let joined_test = test.clone();
                let result = async move {
                    match join.await {
                        Ok(result) => result,
                        Err(error) => {
                            let cause = if error.is_panic() {
                                FailureCause::Panic(crate::outcome::panic_message(
                                    error.into_panic().as_ref(),
                                ))
                            } else {
                                FailureCause::error(anyhow::anyhow!("test execution was cancelled"))
                            };
                            TestPlusResult::new(joined_test, TestResult::failure(cause))
                        }
                    }
                };
                DeferredResult {
                    test,
                    result: result.boxed().shared(),
                    abort: Some(abort),
                }
            }
            Err(_) => {
                warn!(target: "nestrun::scheduler", test = %test, "no tokio runtime, running the test when it is awaited");
                DeferredResult {
                    test,
                    result: run.boxed().shared(),
                    abort: None,
                }
            }
        }
    }
}
