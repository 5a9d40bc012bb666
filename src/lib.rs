//! nestrun - concurrent execution engine for nested test suites
//!
//! A suite is a list of root contexts. Each root context is a function
//! that declares tests and child contexts on a [`ContextDsl`]. The engine
//! discovers the whole tree, runs every test concurrently and reports the
//! results in declaration order.
//!
//! # Quick Start
//!
//! ```ignore
//! use nestrun::{RunConfig, Suite};
//!
//! let suite = Suite::from_fn(|ctx| {
//!     ctx.test("adds", |_, ()| async { assert_eq!(1 + 1, 2) });
//!     ctx.describe("a child", |ctx| {
//!         ctx.test("runs against fresh setup", |_, ()| async {});
//!     });
//! });
//! let result = suite.run(&RunConfig::default()).await?;
//! assert!(result.all_ok());
//! ```
//!
//! # Isolation
//!
//! Contexts are isolated unless declared otherwise: every test of an
//! isolated context sees freshly re-run setup, which the engine achieves by
//! replaying the declaration from the root.

pub use nestrun_core::*;
pub use nestrun_engine::*;
