//! Execution listener
//!
//! Callers observe discovery and execution through this trait. Every method
//! has a no-op default so implementations only override what they need.
//! Events are delivered in temporal order and may interleave across tests.

use crate::context::{Context, TestDescription};
use crate::result::TestResult;

/// Observer of discovery and execution events.
pub trait ExecutionListener: Send + Sync {
    /// A test was registered for the first time.
    fn test_discovered(&self, _test: &TestDescription) {}

    /// A context was registered for the first time.
    fn context_discovered(&self, _context: &Context) {}

    /// A test body is about to run.
    fn test_started(&self, _test: &TestDescription) {}

    /// A test produced its result.
    fn test_finished(&self, _test: &TestDescription, _result: &TestResult) {}
}

/// Listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl ExecutionListener for NoopListener {}
