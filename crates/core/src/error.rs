//! Error types for nestrun
//!
//! This module defines the declaration-level and suite-level errors.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Per-test causes live in [`crate::result::FailureCause`]; the errors here
//! describe problems with the structure of a declaration or of a whole run.

use thiserror::Error;

/// Problems found while walking a context declaration.
///
/// `DuplicateName`, `ReplayDivergence` and `NoProgress` are fatal for the
/// root context they occur in. `IsolationReenabled` only fails the subtree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Two siblings share a name
    #[error("duplicate name \"{name}\" in context \"{context}\"")]
    DuplicateName {
        /// The repeated name
        name: String,
        /// Name of the container that declared it twice
        context: String,
    },

    /// A context asked for isolation below a parent without isolation
    #[error("in a context without isolation it can not be turned on again (context \"{context}\")")]
    IsolationReenabled {
        /// Path of the offending context
        context: String,
    },

    /// Replaying a container declared a different sequence of names
    #[error("context \"{context}\" declared {actual:?} on replay but {expected:?} before")]
    ReplayDivergence {
        /// Path of the container
        context: String,
        /// Names declared the first time the body ran
        expected: Vec<String>,
        /// Names declared on the replay
        actual: Vec<String>,
    },

    /// A discovery pass reported unvisited contexts without processing anything
    #[error("root context \"{context}\" made no progress during a discovery pass")]
    NoProgress {
        /// Name of the root context
        context: String,
    },

    /// The single-test executor could not reach its target
    #[error("test \"{test}\" was not found when replaying its root context")]
    TestNotFound {
        /// Rendered path of the missing test
        test: String,
    },
}

/// Errors of a whole suite run.
#[derive(Debug, Error)]
pub enum SuiteError {
    /// A suite was constructed without context providers
    #[error("a suite needs at least one context provider")]
    EmptySuite,

    /// The global watchdog fired before every test finished
    #[error("watchdog expired after {timeout_ms}ms with {} unfinished tests", pending.len())]
    WatchdogExpired {
        /// Configured watchdog timeout
        timeout_ms: u64,
        /// Rendered descriptions of the tests that had not finished
        pending: Vec<String>,
    },
}
