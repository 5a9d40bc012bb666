//! Core types for nestrun
//!
//! This crate defines the vocabulary shared by the engine and its callers:
//! - Context, ContextPath, TestDescription: identities in the test tree
//! - TestResult, FailureCause: test outcomes
//! - TestFilter: path predicates deciding what gets visited
//! - ExecutionListener: discovery and execution events
//! - Error: declaration-level and suite-level errors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod filter;
pub mod listener;
pub mod result;

pub use context::{Context, ContextPath, SourceInfo, TestDescription, PATH_SEPARATOR};
pub use error::{EngineError, SuiteError};
pub use filter::{parse_filter_string, ExecuteAllTests, StringListTestFilter, TestFilter};
pub use listener::{ExecutionListener, NoopListener};
pub use result::{FailureCause, TestPlusResult, TestResult};
