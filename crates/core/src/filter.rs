//! Path-based test filters
//!
//! A filter decides whether a path (root name, container names, leaf name)
//! should be visited. Containers on the way to an accepted path are accepted
//! too, otherwise the walker could never reach it.

use crate::context::ContextPath;
use std::fmt;

/// Decides which paths of the test tree are visited.
pub trait TestFilter: fmt::Debug + Send + Sync {
    /// Whether the path given as names, root first, should be visited.
    fn should_run_names(&self, names: &[String]) -> bool;

    /// Whether a child of a container should be visited.
    fn should_run(&self, path: &ContextPath) -> bool {
        self.should_run_names(&path.names())
    }
}

/// Accepts every path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteAllTests;

impl TestFilter for ExecuteAllTests {
    fn should_run_names(&self, _names: &[String]) -> bool {
        true
    }
}

/// Accepts one literal path, its ancestors and everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringListTestFilter {
    filter: Vec<String>,
}

impl StringListTestFilter {
    /// Filter for the given names, root first.
    pub fn new<S: Into<String>>(filter: impl IntoIterator<Item = S>) -> Self {
        Self {
            filter: filter.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a filter string such as `root > child > test 4`.
    pub fn parse(filter: &str) -> Self {
        Self::new(parse_filter_string(filter))
    }

    /// The names this filter matches, root first.
    pub fn names(&self) -> &[String] {
        &self.filter
    }
}

impl TestFilter for StringListTestFilter {
    fn should_run_names(&self, names: &[String]) -> bool {
        names
            .iter()
            .zip(self.filter.iter())
            .all(|(name, wanted)| name == wanted)
    }
}

/// Split a filter string on `>` or `✔` and trim every segment.
///
/// Empty segments are dropped, so an empty string yields an empty list.
pub fn parse_filter_string(filter: &str) -> Vec<String> {
    filter
        .split(['>', '✔'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(String::from)
        .collect()
}
