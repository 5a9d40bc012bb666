//! Declaration API
//!
//! A [`ContextDsl`] is lent to exactly one call of a context body. Tests and
//! child contexts can only be registered through that `&mut` borrow, so a
//! registration can never escape into a container whose body has returned.
//!
//! The same body runs in two situations: while the tree is being discovered
//! and while a single isolated test is being replayed. The builder forwards
//! every registration to the walk it belongs to.

use crate::execution::{after_suite_fn, chain_given, run_test, GivenFn, TestContext};
use crate::outcome::{catch_body, IntoOutcome};
use crate::replay::ReplayState;
use crate::resources::ResourceScope;
use crate::walker::DiscoveryState;
use futures::future::BoxFuture;
use futures::FutureExt;
use nestrun_core::{Context, EngineError, FailureCause, SourceInfo, TestDescription, TestResult};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

// ============================================================================
// Options
// ============================================================================

/// Attributes of a declared test.
#[derive(Debug, Clone, Default)]
pub struct TestOptions {
    pub(crate) tags: Vec<String>,
    pub(crate) ignored: Option<String>,
}

impl TestOptions {
    /// Default options: no tags, not ignored.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Skip the test, reporting `reason`.
    pub fn ignored(mut self, reason: impl Into<String>) -> Self {
        self.ignored = Some(reason.into());
        self
    }
}

/// Attributes of a declared child context.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub(crate) tags: Vec<String>,
    pub(crate) isolation: Option<bool>,
    pub(crate) ignored: Option<String>,
}

impl ContextOptions {
    /// Default options: no tags, isolation inherited, not ignored.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Turn isolation off (or explicitly on) for this subtree.
    ///
    /// Turning it back on below a context without isolation fails the
    /// context.
    pub fn isolation(mut self, isolation: bool) -> Self {
        self.isolation = Some(isolation);
        self
    }

    /// Do not run the context body; report one skipped test instead.
    pub fn ignored(mut self, reason: impl Into<String>) -> Self {
        self.ignored = Some(reason.into());
        self
    }
}

// ============================================================================
// Walk state
// ============================================================================

/// The walk a body runs in.
pub(crate) enum Walk<'w> {
    Discover(&'w mut DiscoveryState),
    Replay(&'w mut ReplayState),
}

impl Walk<'_> {
    fn is_aborted(&self) -> bool {
        match self {
            Walk::Discover(state) => state.fatal.is_some(),
            Walk::Replay(state) => state.is_failed(),
        }
    }

    fn abort(&mut self, error: EngineError) {
        match self {
            Walk::Discover(state) => {
                state.fatal.get_or_insert(error);
            }
            Walk::Replay(state) => state.fail(error.into()),
        }
    }
}

/// Per-invocation bookkeeping of one container body.
pub(crate) struct Container {
    pub(crate) context: Arc<Context>,
    pub(crate) scope: Arc<ResourceScope>,
    /// Run children regardless of tags (an ancestor carries the active tag)
    pub(crate) execute_all: bool,
    /// The body already completed once in an earlier pass
    pub(crate) investigated: bool,
    names: HashSet<String>,
    pub(crate) declared: Vec<String>,
    /// Declaration indices from the root down to this container
    pub(crate) position: Vec<usize>,
    pub(crate) ran_a_test: bool,
    pub(crate) contexts_left: bool,
}

impl Container {
    /// Position of the most recent declaration in this container.
    pub(crate) fn declaration_position(&self) -> Vec<usize> {
        let mut position = self.position.clone();
        position.push(self.declared.len().saturating_sub(1));
        position
    }

    pub(crate) fn new(
        context: Arc<Context>,
        scope: Arc<ResourceScope>,
        execute_all: bool,
        investigated: bool,
    ) -> Self {
        Self {
            context,
            scope,
            execute_all,
            investigated,
            names: HashSet::new(),
            declared: Vec::new(),
            position: Vec::new(),
            ran_a_test: false,
            contexts_left: false,
        }
    }
}

/// Something that can run a child context body inside a walk.
pub(crate) trait EnterContext {
    fn enter(self, walk: Walk<'_>, container: Container) -> (Result<(), FailureCause>, Container);
}

struct ChildBody<C, B> {
    given: GivenFn<C>,
    body: B,
}

impl<C, B, R> EnterContext for ChildBody<C, B>
where
    C: Send + 'static,
    B: FnOnce(&mut ContextDsl<'_, C>) -> R,
    R: IntoOutcome,
{
    fn enter(self, walk: Walk<'_>, container: Container) -> (Result<(), FailureCause>, Container) {
        let mut dsl = ContextDsl::new(walk, container, self.given);
        let body = self.body;
        let outcome = catch_body(|| body(&mut dsl));
        (outcome, dsl.into_container())
    }
}

/// Factory for the execution of one declared test.
pub(crate) type TestUnit<'a> =
    Box<dyn FnOnce(TestDescription, Arc<ResourceScope>, bool) -> BoxFuture<'static, TestResult> + 'a>;

// ============================================================================
// ContextDsl
// ============================================================================

/// Builder lent to one invocation of a context body.
///
/// `G` is the value every test in this context receives, produced by the
/// given chain of the context and its ancestors.
pub struct ContextDsl<'w, G> {
    walk: Walk<'w>,
    container: Container,
    given: GivenFn<G>,
}

impl<'w, G> ContextDsl<'w, G>
where
    G: Send + 'static,
{
    pub(crate) fn new(walk: Walk<'w>, container: Container, given: GivenFn<G>) -> Self {
        Self {
            walk,
            container,
            given,
        }
    }

    pub(crate) fn into_container(self) -> Container {
        self.container
    }

    /// The context this body declares.
    pub fn context(&self) -> &Arc<Context> {
        &self.container.context
    }

    /// Declare a test.
    #[track_caller]
    pub fn test<F, Fut, R>(&mut self, name: impl Into<String>, body: F)
    where
        F: FnOnce(TestContext, G) -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome + 'static,
    {
        let source = SourceInfo::caller();
        self.register_test(name.into(), TestOptions::default(), source, body);
    }

    /// Declare a test with tags or an ignore reason.
    #[track_caller]
    pub fn test_with<F, Fut, R>(&mut self, name: impl Into<String>, options: TestOptions, body: F)
    where
        F: FnOnce(TestContext, G) -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome + 'static,
    {
        let source = SourceInfo::caller();
        self.register_test(name.into(), options, source, body);
    }

    /// Declare a test that is reported as pending and never runs.
    #[track_caller]
    pub fn ignore<F, Fut, R>(&mut self, name: impl Into<String>, _body: F)
    where
        F: FnOnce(TestContext, G) -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome + 'static,
    {
        let source = SourceInfo::caller();
        let name = name.into();
        if !self.declare(&name) {
            return;
        }
        if let Walk::Discover(state) = &mut self.walk {
            state.visit_pending(&self.container, name, source);
        }
    }

    /// Declare a child context whose tests receive the same value as this one.
    #[track_caller]
    pub fn describe<B, R>(&mut self, name: impl Into<String>, body: B)
    where
        B: FnOnce(&mut ContextDsl<'_, G>) -> R,
        R: IntoOutcome,
    {
        let source = SourceInfo::caller();
        let given = Arc::clone(&self.given);
        self.register_context(name.into(), ContextOptions::default(), source, ChildBody { given, body });
    }

    /// Declare a child context with tags, isolation or an ignore reason.
    #[track_caller]
    pub fn describe_with<B, R>(&mut self, name: impl Into<String>, options: ContextOptions, body: B)
    where
        B: FnOnce(&mut ContextDsl<'_, G>) -> R,
        R: IntoOutcome,
    {
        let source = SourceInfo::caller();
        let given = Arc::clone(&self.given);
        self.register_context(name.into(), options, source, ChildBody { given, body });
    }

    /// Declare a child context that derives a new value from this one.
    ///
    /// `producer` runs once for every test of the child, after the
    /// producers of all ancestors.
    #[track_caller]
    pub fn describe_given<C, P, Fut, E, B, R>(&mut self, name: impl Into<String>, producer: P, body: B)
    where
        C: Send + 'static,
        P: Fn(G) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
        B: FnOnce(&mut ContextDsl<'_, C>) -> R,
        R: IntoOutcome,
    {
        let source = SourceInfo::caller();
        let given = chain_given(Arc::clone(&self.given), producer);
        self.register_context(name.into(), ContextOptions::default(), source, ChildBody { given, body });
    }

    /// [`ContextDsl::describe_given`] with options.
    #[track_caller]
    pub fn describe_given_with<C, P, Fut, E, B, R>(
        &mut self,
        name: impl Into<String>,
        options: ContextOptions,
        producer: P,
        body: B,
    ) where
        C: Send + 'static,
        P: Fn(G) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
        B: FnOnce(&mut ContextDsl<'_, C>) -> R,
        R: IntoOutcome,
    {
        let source = SourceInfo::caller();
        let given = chain_given(Arc::clone(&self.given), producer);
        self.register_context(name.into(), options, source, ChildBody { given, body });
    }

    /// Register a resource closed when the owning scope is closed.
    ///
    /// In an isolated context that is the end of each test; otherwise it is
    /// the end of the suite.
    pub fn auto_close<R, F, O>(&mut self, resource: R, closer: F) -> Arc<R>
    where
        R: Send + Sync + 'static,
        F: FnOnce(&R) -> O + Send + 'static,
        O: IntoOutcome,
    {
        self.container.scope.auto_close(resource, closer)
    }

    /// Register a callback that runs after every test using this scope.
    pub fn after_each<F, Fut, O>(&mut self, callback: F)
    where
        F: Fn(TestDescription, TestResult) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
        O: IntoOutcome + 'static,
    {
        self.container.scope.after_each(callback);
    }

    /// Register a callback that runs once after the whole suite.
    ///
    /// Only the first investigation of a context registers it, so replays
    /// do not add duplicates.
    pub fn after_suite<F, Fut, R>(&mut self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome + 'static,
    {
        if let Walk::Discover(state) = &mut self.walk {
            if !self.container.investigated {
                state.after_suite.push(after_suite_fn(callback));
            }
        }
    }

    fn declare(&mut self, name: &str) -> bool {
        if self.walk.is_aborted() {
            return false;
        }
        self.container.declared.push(name.to_string());
        if !self.container.names.insert(name.to_string()) {
            let error = EngineError::DuplicateName {
                name: name.to_string(),
                context: self.container.context.name().to_string(),
            };
            self.walk.abort(error);
            return false;
        }
        true
    }

    fn register_test<F, Fut, R>(&mut self, name: String, options: TestOptions, source: SourceInfo, body: F)
    where
        F: FnOnce(TestContext, G) -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome + 'static,
    {
        if !self.declare(&name) {
            return;
        }
        let given = Arc::clone(&self.given);
        let unit: TestUnit<'_> = Box::new(move |test, scope, close_resources| {
            run_test(test, given, body, scope, close_resources).boxed()
        });
        match &mut self.walk {
            Walk::Discover(state) => state.visit_test(&mut self.container, name, options, source, unit),
            Walk::Replay(state) => state.visit_test(&self.container, name, source, unit),
        }
    }

    fn register_context<E: EnterContext>(
        &mut self,
        name: String,
        options: ContextOptions,
        source: SourceInfo,
        child: E,
    ) {
        if !self.declare(&name) {
            return;
        }
        match &mut self.walk {
            Walk::Discover(state) => state.visit_context(&mut self.container, name, options, source, child),
            Walk::Replay(state) => state.visit_context(&self.container, name, options, source, child),
        }
    }
}

impl<G> fmt::Debug for ContextDsl<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextDsl")
            .field("context", &self.container.context.to_string())
            .field("declared", &self.container.declared)
            .finish()
    }
}
