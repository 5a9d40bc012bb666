//! Test outcomes
//!
//! A [`TestResult`] is terminal and immutable once produced. It is `Clone`
//! because one result is handed to every awaiter of a deferred result.

use crate::context::TestDescription;
use crate::error::EngineError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a test failed.
#[derive(Debug, Clone, Error)]
pub enum FailureCause {
    /// The body, a given producer, a declaration or a cleanup returned an error
    #[error("{0}")]
    Error(Arc<anyhow::Error>),

    /// The body, a given producer, a declaration or a cleanup panicked
    #[error("panicked: {0}")]
    Panic(String),

    /// The test did not finish within its timeout
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The engine rejected the declaration around the test
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl FailureCause {
    /// Wrap any error.
    pub fn error(error: impl Into<anyhow::Error>) -> Self {
        FailureCause::Error(Arc::new(error.into()))
    }

    /// True when the test was cancelled by its timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, FailureCause::Timeout(_))
    }

    /// The user error, if this cause wraps one.
    pub fn as_error(&self) -> Option<&anyhow::Error> {
        match self {
            FailureCause::Error(error) => Some(error),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for FailureCause {
    fn from(error: anyhow::Error) -> Self {
        FailureCause::Error(Arc::new(error))
    }
}

/// Outcome of one test.
#[derive(Debug, Clone)]
pub enum TestResult {
    /// The test passed
    Success {
        /// Wall-clock time spent resolving the given chain and running the body
        elapsed_micros: u64,
    },
    /// The test failed
    Failure {
        /// What went wrong
        cause: FailureCause,
    },
    /// The test or its context was ignored with a reason
    Skipped {
        /// Reason given at declaration
        reason: String,
    },
    /// The test was declared with `ignore` and never ran
    Pending,
}

impl TestResult {
    /// Build a failure from a cause.
    pub fn failure(cause: impl Into<FailureCause>) -> Self {
        TestResult::Failure {
            cause: cause.into(),
        }
    }

    /// True for [`TestResult::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, TestResult::Success { .. })
    }

    /// True for [`TestResult::Failure`]
    pub fn is_failure(&self) -> bool {
        matches!(self, TestResult::Failure { .. })
    }

    /// True for [`TestResult::Skipped`]
    pub fn is_skipped(&self) -> bool {
        matches!(self, TestResult::Skipped { .. })
    }

    /// True for [`TestResult::Pending`]
    pub fn is_pending(&self) -> bool {
        matches!(self, TestResult::Pending)
    }

    /// The failure cause, if this result is a failure.
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            TestResult::Failure { cause } => Some(cause),
            _ => None,
        }
    }
}

/// A test paired with its outcome.
#[derive(Debug, Clone)]
pub struct TestPlusResult {
    /// The test
    pub test: TestDescription,
    /// Its outcome
    pub result: TestResult,
}

impl TestPlusResult {
    /// Pair a description with a result.
    pub fn new(test: TestDescription, result: TestResult) -> Self {
        Self { test, result }
    }

    /// See [`TestResult::is_success`]
    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }

    /// See [`TestResult::is_failure`]
    pub fn is_failure(&self) -> bool {
        self.result.is_failure()
    }

    /// See [`TestResult::is_skipped`]
    pub fn is_skipped(&self) -> bool {
        self.result.is_skipped()
    }

    /// See [`TestResult::is_pending`]
    pub fn is_pending(&self) -> bool {
        self.result.is_pending()
    }
}
