//! Outcomes of user code
//!
//! Context bodies, test bodies, closers and callbacks may return `()` or a
//! `Result`. Panics are caught and turned into [`FailureCause::Panic`], the
//! same way a panicking background task is isolated from its worker.

use futures::FutureExt;
use nestrun_core::FailureCause;
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Return types accepted from user code.
pub trait IntoOutcome {
    /// Convert into a plain `anyhow` result.
    fn into_outcome(self) -> anyhow::Result<()>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> IntoOutcome for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_outcome(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "(non-string panic)".to_string()
    }
}

/// Run synchronous user code, catching errors and panics.
pub(crate) fn catch_body<R, F>(body: F) -> Result<(), FailureCause>
where
    F: FnOnce() -> R,
    R: IntoOutcome,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(outcome) => outcome.into_outcome().map_err(FailureCause::from),
        Err(payload) => Err(FailureCause::Panic(panic_message(payload.as_ref()))),
    }
}

/// Await user code, catching errors and panics.
pub(crate) async fn catch_future<R, Fut>(future: Fut) -> Result<(), FailureCause>
where
    Fut: Future<Output = R>,
    R: IntoOutcome,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(outcome) => outcome.into_outcome().map_err(FailureCause::from),
        Err(payload) => Err(FailureCause::Panic(panic_message(payload.as_ref()))),
    }
}
