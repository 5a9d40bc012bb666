//! Execution engine for nestrun
//!
//! This crate turns nested context declarations into running tests:
//! - ContextDsl: the builder lent to every context body
//! - Walker: repeated discovery passes over one root context
//! - Replay: the single-test executor for isolated tests
//! - Scheduler: concurrent, cancellable test units and deferred results
//! - Suite: root ordering, awaiting, watchdog and teardown
//!
//! Context bodies run again for every pass and every isolated test, so
//! they must declare the same tests and contexts each time they run.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
mod dsl;
mod execution;
pub mod logging;
mod outcome;
mod replay;
mod resources;
mod root;
mod scheduler;
mod suite;
mod walker;

pub use config::{ConfigError, RunConfig, CONFIG_FILE_NAME};
pub use dsl::{ContextDsl, ContextOptions, TestOptions};
pub use execution::TestContext;
pub use outcome::IntoOutcome;
pub use replay::SingleTestExecutor;
pub use resources::ResourceScope;
pub use root::{RootContext, RootContextResult, TestResults};
pub use scheduler::DeferredResult;
pub use suite::{ContextProvider, FailedRootContext, Suite, SuiteResult};
pub use walker::ERROR_IN_CONTEXT;

pub use nestrun_core;
