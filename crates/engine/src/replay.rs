//! Single-test executor
//!
//! Replays a root context and descends only along the path to one test,
//! so the test observes the setup of its ancestors but nothing a sibling
//! test did. The replay gets a fresh resource scope that is closed when the
//! test finishes.

use crate::dsl::{Container, ContextDsl, ContextOptions, EnterContext, TestUnit, Walk};
use crate::execution::unit_given;
use crate::outcome::catch_body;
use crate::resources::ResourceScope;
use crate::root::RootContext;
use futures::future::BoxFuture;
use nestrun_core::{Context, ContextPath, EngineError, FailureCause, SourceInfo, TestDescription, TestResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Bookkeeping of one replay walk.
pub(crate) struct ReplayState {
    target: Vec<String>,
    found: Option<BoxFuture<'static, TestResult>>,
    failure: Option<FailureCause>,
}

impl ReplayState {
    fn new(target: Vec<String>) -> Self {
        Self {
            target,
            found: None,
            failure: None,
        }
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Keep the first failure raised while replaying.
    pub(crate) fn fail(&mut self, cause: FailureCause) {
        self.failure.get_or_insert(cause);
    }

    fn path_to(container: &Container, name: &str) -> Vec<String> {
        let mut path = container.context.path();
        path.push(name.to_string());
        path
    }

    pub(crate) fn visit_test(
        &mut self,
        container: &Container,
        name: String,
        source: SourceInfo,
        unit: TestUnit<'_>,
    ) {
        if self.found.is_some() || Self::path_to(container, &name) != self.target {
            return;
        }
        let test = TestDescription::new(&container.context, name, Some(source));
        self.found = Some(unit(test, Arc::clone(&container.scope), true));
    }

    pub(crate) fn visit_context<E: EnterContext>(
        &mut self,
        container: &Container,
        name: String,
        options: ContextOptions,
        source: SourceInfo,
        child: E,
    ) {
        let path = Self::path_to(container, &name);
        if self.found.is_some()
            || options.ignored.is_some()
            || path.len() >= self.target.len()
            || !self.target.starts_with(&path)
        {
            return;
        }
        let isolation = container.context.isolation() && options.isolation != Some(false);
        let context = Context::child(&container.context, name, Some(source), isolation);
        let inner = Container::new(context, Arc::clone(&container.scope), true, true);
        let (outcome, _) = child.enter(Walk::Replay(&mut *self), inner);
        if let Err(cause) = outcome {
            self.fail(cause);
        }
    }
}

/// Runs exactly one test of a root context by replaying the root.
pub struct SingleTestExecutor {
    root: RootContext,
    target: ContextPath,
    scope: Arc<ResourceScope>,
}

impl SingleTestExecutor {
    /// Executor for the test at `target` inside `root`.
    pub fn new(root: &RootContext, target: ContextPath) -> Self {
        Self::with_scope(root, target, Arc::new(ResourceScope::new()))
    }

    pub(crate) fn with_scope(root: &RootContext, target: ContextPath, scope: Arc<ResourceScope>) -> Self {
        Self {
            root: root.clone(),
            target,
            scope,
        }
    }

    /// Replay the root and run the target test.
    ///
    /// Failures of the replayed bodies become the test's failure. A target
    /// that the replay never reaches yields [`EngineError::TestNotFound`].
    pub async fn execute(self) -> TestResult {
        let found = match self.replay() {
            Ok(found) => found,
            Err(cause) => {
                debug!(target: "nestrun::walker", test = %self.target, error = %cause, "replay failed");
                self.close_scope();
                return TestResult::failure(cause);
            }
        };
        match found {
            Some(unit) => unit.await,
            None => {
                self.close_scope();
                TestResult::failure(EngineError::TestNotFound {
                    test: self.target.to_string(),
                })
            }
        }
    }

    fn replay(&self) -> Result<Option<BoxFuture<'static, TestResult>>, FailureCause> {
        let mut state = ReplayState::new(self.target.names());
        let container = Container::new(self.root.context(), Arc::clone(&self.scope), true, true);
        let mut dsl = ContextDsl::new(Walk::Replay(&mut state), container, unit_given());
        let outcome = catch_body(|| self.root.body().call(&mut dsl));
        drop(dsl);
        outcome?;
        match state.failure {
            Some(cause) => Err(cause),
            None => Ok(state.found),
        }
    }

    fn close_scope(&self) {
        if let Err(cause) = self.scope.close_auto_closeables() {
            warn!(target: "nestrun::walker", test = %self.target, error = %cause, "closing replay resources failed");
        }
    }
}
