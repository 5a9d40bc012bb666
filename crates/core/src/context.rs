//! Identity types for the test tree
//!
//! - Context: a named node of the tree, linked to its parent
//! - ContextPath: a child (test or context) of a container that has not been
//!   materialized yet, used as the discovery and filter key
//! - TestDescription: the identity of one declared test
//! - SourceInfo: where a test or context was declared
//!
//! Contexts are rebuilt on every discovery pass, so identity is structural:
//! two contexts are equal when their paths from the root are equal.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Separator used when rendering paths for humans and in filter strings.
pub const PATH_SEPARATOR: &str = " > ";

/// Location of a declaration in source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceInfo {
    /// Source file as reported by the compiler
    pub file: &'static str,
    /// 1-based line number
    pub line: u32,
}

impl SourceInfo {
    /// Capture the location of the caller.
    ///
    /// Only meaningful when every function between the declaration site and
    /// this call is marked `#[track_caller]`.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

// ============================================================================
// Context
// ============================================================================

/// A named grouping node in the test tree.
///
/// The parent link is a shared back-reference; a context never owns its
/// children. Equality and hashing only consider the path from the root.
#[derive(Debug, Clone)]
pub struct Context {
    name: String,
    parent: Option<Arc<Context>>,
    source_info: Option<SourceInfo>,
    isolation: bool,
}

impl Context {
    /// Create a root context.
    pub fn root(
        name: impl Into<String>,
        source_info: Option<SourceInfo>,
        isolation: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent: None,
            source_info,
            isolation,
        })
    }

    /// Create a child of `parent`.
    pub fn child(
        parent: &Arc<Context>,
        name: impl Into<String>,
        source_info: Option<SourceInfo>,
        isolation: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent: Some(Arc::clone(parent)),
            source_info,
            isolation,
        })
    }

    /// Build a context chain from a list of names, root first.
    ///
    /// Every node gets default attributes (no source info, isolation on).
    /// Returns `None` for an empty path.
    pub fn from_path<S: AsRef<str>>(path: &[S]) -> Option<Arc<Self>> {
        let (first, rest) = path.split_first()?;
        let mut context = Context::root(first.as_ref(), None, true);
        for name in rest {
            context = Context::child(&context, name.as_ref(), None, true);
        }
        Some(context)
    }

    /// Name of this node
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent node, `None` for a root context
    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }

    /// Where this context was declared
    pub fn source_info(&self) -> Option<SourceInfo> {
        self.source_info
    }

    /// Whether tests of this context run against freshly replayed setup
    pub fn isolation(&self) -> bool {
        self.isolation
    }

    /// True for contexts without a parent
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Number of ancestors
    pub fn depth(&self) -> usize {
        self.parent.as_ref().map_or(0, |p| p.depth() + 1)
    }

    /// Names from the root down to and including this context.
    pub fn path(&self) -> Vec<String> {
        let mut path = match &self.parent {
            Some(parent) => parent.path(),
            None => Vec::new(),
        };
        path.push(self.name.clone());
        path
    }

    /// Ancestors of this context, root first, excluding `self`.
    pub fn parents(&self) -> Vec<Arc<Context>> {
        match &self.parent {
            Some(parent) => {
                let mut parents = parent.parents();
                parents.push(Arc::clone(parent));
                parents
            }
            None => Vec::new(),
        }
    }

    /// Human readable path, e.g. `root > child`.
    pub fn string_path(&self) -> String {
        self.path().join(PATH_SEPARATOR)
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && match (&self.parent, &other.parent) {
                (Some(a), Some(b)) => a == b,
                (None, None) => true,
                _ => false,
            }
    }
}

impl Eq for Context {}

impl Hash for Context {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if let Some(parent) = &self.parent {
            parent.hash(state);
        }
        self.name.hash(state);
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string_path())
    }
}

// ============================================================================
// ContextPath
// ============================================================================

/// A named child of a container that has not been materialized yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextPath {
    /// The context that declares the child
    pub container: Arc<Context>,
    /// Name of the test or child context
    pub name: String,
}

impl ContextPath {
    /// Create a path for `name` inside `container`.
    pub fn new(container: &Arc<Context>, name: impl Into<String>) -> Self {
        Self {
            container: Arc::clone(container),
            name: name.into(),
        }
    }

    /// Container path followed by the child name.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.container.path();
        names.push(self.name.clone());
        names
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.container, PATH_SEPARATOR, self.name)
    }
}

// ============================================================================
// TestDescription
// ============================================================================

/// Identity of one declared test, used as the key for result lookup.
///
/// Source info is carried along but is not part of the identity.
#[derive(Debug, Clone)]
pub struct TestDescription {
    /// Context that declares the test
    pub container: Arc<Context>,
    /// Name of the test inside its container
    pub test_name: String,
    /// Where the test was declared
    pub source_info: Option<SourceInfo>,
}

impl TestDescription {
    /// Create a description.
    pub fn new(
        container: &Arc<Context>,
        test_name: impl Into<String>,
        source_info: Option<SourceInfo>,
    ) -> Self {
        Self {
            container: Arc::clone(container),
            test_name: test_name.into(),
            source_info,
        }
    }

    /// The discovery key of this test.
    pub fn context_path(&self) -> ContextPath {
        ContextPath::new(&self.container, self.test_name.clone())
    }
}

impl PartialEq for TestDescription {
    fn eq(&self, other: &Self) -> bool {
        self.test_name == other.test_name && self.container == other.container
    }
}

impl Eq for TestDescription {}

impl Hash for TestDescription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.container.hash(state);
        self.test_name.hash(state);
    }
}

impl fmt::Display for TestDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.container, PATH_SEPARATOR, self.test_name)
    }
}
