//! Engine integration tests
//!
//! Each module drives whole suites through the public API and checks
//! discovery, isolation, filtering, failure handling and teardown.

#[path = "../common/mod.rs"]
mod common;

mod filtering;
mod isolation;
