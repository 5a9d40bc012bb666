//! Root contexts and their executor
//!
//! The executor drives discovery passes over one root body until no
//! context is left unvisited, then hands the discovered tree and the
//! deferred results to the caller.

use crate::dsl::{Container, ContextDsl, Walk};
use crate::execution::{unit_given, AfterSuiteFn};
use crate::outcome::{catch_body, IntoOutcome};
use crate::resources::ResourceScope;
use crate::scheduler::{DeferredResult, TestScheduler};
use crate::walker::DiscoveryState;
use futures::future::join_all;
use indexmap::IndexMap;
use nestrun_core::{
    Context, EngineError, ExecutionListener, FailureCause, SourceInfo, TestDescription, TestFilter,
    TestPlusResult, TestResult,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

// ============================================================================
// RootContext
// ============================================================================

/// A root body, callable once per discovery pass and once per replay.
pub(crate) trait RootBody: Send + Sync {
    fn call(&self, dsl: &mut ContextDsl<'_, ()>) -> anyhow::Result<()>;
}

impl<F, R> RootBody for F
where
    F: Fn(&mut ContextDsl<'_, ()>) -> R + Send + Sync,
    R: IntoOutcome,
{
    fn call(&self, dsl: &mut ContextDsl<'_, ()>) -> anyhow::Result<()> {
        self(dsl).into_outcome()
    }
}

/// A top-level context declaration.
///
/// The body is run again for every discovery pass and every isolated
/// replay, so it must declare the same structure each time.
#[derive(Clone)]
pub struct RootContext {
    name: String,
    body: Arc<dyn RootBody>,
    isolation: bool,
    ignored: Option<String>,
    order: i32,
    tags: Vec<String>,
    source_info: Option<SourceInfo>,
}

impl RootContext {
    /// Declare a root context.
    #[track_caller]
    pub fn new<F, R>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut ContextDsl<'_, ()>) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        Self {
            name: name.into(),
            body: Arc::new(body),
            isolation: true,
            ignored: None,
            order: 0,
            tags: Vec::new(),
            source_info: Some(SourceInfo::caller()),
        }
    }

    /// Turn isolation on or off for the whole tree.
    pub fn with_isolation(mut self, isolation: bool) -> Self {
        self.isolation = isolation;
        self
    }

    /// Position among the roots of a suite; lower runs first.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Attach a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Skip the root, reporting `reason`.
    pub fn ignored(mut self, reason: impl Into<String>) -> Self {
        self.ignored = Some(reason.into());
        self
    }

    /// Name of the root
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the root runs with isolation
    pub fn isolation(&self) -> bool {
        self.isolation
    }

    /// Position among the roots of a suite
    pub fn order(&self) -> i32 {
        self.order
    }

    /// Tags attached to the root
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub(crate) fn body(&self) -> &Arc<dyn RootBody> {
        &self.body
    }

    pub(crate) fn renamed(&self, name: String) -> Self {
        Self {
            name,
            ..self.clone()
        }
    }

    /// The context node of this root.
    pub fn context(&self) -> Arc<Context> {
        Context::root(self.name.clone(), self.source_info, self.isolation)
    }
}

impl fmt::Debug for RootContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootContext")
            .field("name", &self.name)
            .field("isolation", &self.isolation)
            .field("ignored", &self.ignored)
            .field("order", &self.order)
            .field("tags", &self.tags)
            .finish()
    }
}

// ============================================================================
// Results
// ============================================================================

/// Everything discovered under one root context.
pub struct TestResults {
    /// Contexts in first-discovery order
    pub contexts: Vec<Arc<Context>>,
    /// Deferred results in discovery order
    pub tests: IndexMap<TestDescription, DeferredResult>,
    pub(crate) after_suite: Vec<AfterSuiteFn>,
    pub(crate) scopes: Vec<Arc<ResourceScope>>,
}

impl TestResults {
    fn empty() -> Self {
        Self {
            contexts: Vec::new(),
            tests: IndexMap::new(),
            after_suite: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// Await every test, in discovery order.
    pub async fn await_all(&self) -> Vec<TestPlusResult> {
        join_all(self.tests.values().cloned()).await
    }

    /// Close the shared scopes of the discovery passes.
    ///
    /// Call after every test has finished.
    pub fn close_resources(&self) -> Result<(), FailureCause> {
        let mut first_failure = None;
        for scope in self.scopes.iter().rev() {
            if let Err(cause) = scope.close_auto_closeables() {
                first_failure.get_or_insert(cause);
            }
        }
        first_failure.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for TestResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestResults")
            .field("contexts", &self.contexts.len())
            .field("tests", &self.tests.len())
            .field("after_suite", &self.after_suite.len())
            .finish()
    }
}

/// Outcome of discovering one root context.
#[derive(Debug)]
pub enum RootContextResult {
    /// Discovery finished; tests are running or waiting to be awaited
    Executed(TestResults),
    /// The root body failed or the declaration was rejected
    Failed {
        /// The root context
        context: Arc<Context>,
        /// Why it failed
        failure: FailureCause,
    },
}

// ============================================================================
// RootContextExecutor
// ============================================================================

/// Runs discovery passes over one root context.
pub(crate) struct RootContextExecutor<'a> {
    pub(crate) root: &'a RootContext,
    pub(crate) scheduler: Arc<TestScheduler>,
    pub(crate) filter: Arc<dyn TestFilter>,
    pub(crate) only_tag: Option<String>,
    pub(crate) listener: Arc<dyn ExecutionListener>,
    pub(crate) verify_replay: bool,
}

impl RootContextExecutor<'_> {
    pub(crate) fn execute(self) -> RootContextResult {
        let context = self.root.context();
        if !self.filter.should_run_names(&context.path()) {
            debug!(target: "nestrun::walker", root = %context, "root filtered out");
            return RootContextResult::Executed(TestResults::empty());
        }

        let mut state = DiscoveryState::new(
            self.root.clone(),
            self.scheduler,
            self.filter,
            self.only_tag.clone(),
            self.listener,
            self.verify_replay,
        );
        state.register_context(&context, Vec::new());

        if let Some(reason) = &self.root.ignored {
            let test = TestDescription::new(&context, format!("context ignored because {}", reason), self.root.source_info);
            state.record_ready(test, Vec::new(), TestResult::Skipped { reason: reason.clone() });
            return RootContextResult::Executed(state.into_results(Vec::new()));
        }

        let execute_all = match &self.only_tag {
            Some(tag) => self.root.tags.contains(tag),
            None => true,
        };
        let mut scopes = Vec::new();
        let mut passes = 0usize;
        loop {
            passes += 1;
            state.begin_pass();
            let scope = Arc::new(ResourceScope::new());
            scopes.push(Arc::clone(&scope));

            let investigated = state.is_investigated(&context);
            let container = Container::new(Arc::clone(&context), scope, execute_all, investigated);
            let mut dsl = ContextDsl::new(Walk::Discover(&mut state), container, unit_given());
            let outcome = catch_body(|| self.root.body.call(&mut dsl));
            let container = dsl.into_container();

            let failure = match (state.fatal.take(), outcome) {
                (Some(error), _) => Some(FailureCause::from(error)),
                (None, Err(cause)) => Some(cause),
                (None, Ok(())) => {
                    state.verify_declared(&context, container.declared);
                    state.fatal.take().map(FailureCause::from)
                }
            };
            let failure = failure.or_else(|| {
                (container.contexts_left && !state.made_progress()).then(|| {
                    FailureCause::from(EngineError::NoProgress {
                        context: context.name().to_string(),
                    })
                })
            });
            if let Some(failure) = failure {
                error!(target: "nestrun::walker", root = %context, error = %failure, "root context failed");
                state.abort_all();
                for scope in scopes.iter().rev() {
                    if let Err(cause) = scope.close_auto_closeables() {
                        warn!(target: "nestrun::walker", root = %context, error = %cause, "closing resources failed");
                    }
                }
                return RootContextResult::Failed { context, failure };
            }

            state.mark_investigated(&context);
            if !container.contexts_left {
                break;
            }
        }

        debug!(
            target: "nestrun::walker",
            root = %context,
            passes,
            tests = state.test_count(),
            "root context discovered"
        );
        RootContextResult::Executed(state.into_results(scopes))
    }
}
