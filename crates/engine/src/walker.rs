//! Tree walker
//!
//! One discovery pass runs the root body and every container body it can
//! reach. Each declared test or child context is either executed now,
//! scheduled through a replay of the root, deferred to the next pass or
//! skipped. The state here lives for all passes over one root context and
//! is only ever touched by the pass that is running.

use crate::dsl::{Container, ContextOptions, EnterContext, TestOptions, TestUnit, Walk};
use crate::execution::AfterSuiteFn;
use crate::replay::SingleTestExecutor;
use crate::resources::ResourceScope;
use crate::root::{RootContext, TestResults};
use crate::scheduler::{DeferredResult, TestScheduler};
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::{IndexMap, IndexSet};
use nestrun_core::{
    Context, ContextPath, EngineError, ExecutionListener, FailureCause, SourceInfo, TestDescription,
    TestFilter, TestResult,
};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Name of the synthetic test that carries the failure of a context body.
pub const ERROR_IN_CONTEXT: &str = "error in context";

/// Discovery bookkeeping shared by all passes over one root context.
pub(crate) struct DiscoveryState {
    root: RootContext,
    scheduler: Arc<TestScheduler>,
    filter: Arc<dyn TestFilter>,
    only_tag: Option<String>,
    listener: Arc<dyn ExecutionListener>,
    verify_replay: bool,
    processed: HashSet<ContextPath>,
    investigated: HashSet<Arc<Context>>,
    declared: HashMap<Arc<Context>, Vec<String>>,
    contexts: IndexSet<Arc<Context>>,
    tests: IndexMap<TestDescription, DeferredResult>,
    /// Declaration position of every context and test, sorted on at the end
    context_positions: HashMap<Arc<Context>, Vec<usize>>,
    test_positions: HashMap<TestDescription, Vec<usize>>,
    pub(crate) after_suite: Vec<AfterSuiteFn>,
    /// Set on errors that fail the whole root; every later registration is a no-op
    pub(crate) fatal: Option<EngineError>,
    progressed: bool,
}

impl DiscoveryState {
    pub(crate) fn new(
        root: RootContext,
        scheduler: Arc<TestScheduler>,
        filter: Arc<dyn TestFilter>,
        only_tag: Option<String>,
        listener: Arc<dyn ExecutionListener>,
        verify_replay: bool,
    ) -> Self {
        Self {
            root,
            scheduler,
            filter,
            only_tag,
            listener,
            verify_replay,
            processed: HashSet::new(),
            investigated: HashSet::new(),
            declared: HashMap::new(),
            contexts: IndexSet::new(),
            tests: IndexMap::new(),
            context_positions: HashMap::new(),
            test_positions: HashMap::new(),
            after_suite: Vec::new(),
            fatal: None,
            progressed: false,
        }
    }

    // ========================================================================
    // Pass bookkeeping
    // ========================================================================

    pub(crate) fn begin_pass(&mut self) {
        self.progressed = false;
    }

    /// Whether the current pass processed at least one new path.
    pub(crate) fn made_progress(&self) -> bool {
        self.progressed
    }

    pub(crate) fn is_investigated(&self, context: &Arc<Context>) -> bool {
        self.investigated.contains(context)
    }

    pub(crate) fn mark_investigated(&mut self, context: &Arc<Context>) {
        self.investigated.insert(Arc::clone(context));
    }

    fn mark_processed(&mut self, path: ContextPath) -> bool {
        let inserted = self.processed.insert(path);
        self.progressed |= inserted;
        inserted
    }

    fn excluded_by_tag(&self, container: &Container, tags: &[String]) -> bool {
        match &self.only_tag {
            Some(tag) => !container.execute_all && !tags.contains(tag),
            None => false,
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Add a context to the discovered list, keeping first-discovery order.
    pub(crate) fn register_context(&mut self, context: &Arc<Context>, position: Vec<usize>) {
        if self.contexts.insert(Arc::clone(context)) {
            self.context_positions.insert(Arc::clone(context), position);
            debug!(target: "nestrun::walker", context = %context, "context discovered");
            self.listener.context_discovered(context);
        }
    }

    /// Record a test whose result is known without running anything.
    pub(crate) fn record_ready(&mut self, test: TestDescription, position: Vec<usize>, result: TestResult) {
        if self.tests.contains_key(&test) {
            return;
        }
        self.test_positions.insert(test.clone(), position);
        self.listener.test_discovered(&test);
        self.listener.test_finished(&test, &result);
        let deferred = DeferredResult::ready(test.clone(), result);
        self.tests.insert(test, deferred);
    }

    fn schedule(
        &mut self,
        test: TestDescription,
        position: Vec<usize>,
        unit: BoxFuture<'static, TestResult>,
        cleanup: Option<Arc<ResourceScope>>,
    ) {
        debug!(target: "nestrun::walker", test = %test, "test scheduled");
        self.test_positions.insert(test.clone(), position);
        self.listener.test_discovered(&test);
        let deferred = self.scheduler.schedule(test.clone(), unit, cleanup);
        self.tests.insert(test, deferred);
    }

    /// Register `context` as failed with one synthetic failing test.
    pub(crate) fn record_failed_context(
        &mut self,
        context: &Arc<Context>,
        path: ContextPath,
        position: Vec<usize>,
        source: SourceInfo,
        cause: FailureCause,
    ) {
        warn!(target: "nestrun::walker", context = %context, error = %cause, "context failed");
        self.register_context(context, position.clone());
        self.mark_processed(path);
        let test = TestDescription::new(context, ERROR_IN_CONTEXT, Some(source));
        self.record_ready(test, position, TestResult::failure(cause));
    }

    /// Compare the names a container declared with its first completed run.
    pub(crate) fn verify_declared(&mut self, context: &Arc<Context>, names: Vec<String>) {
        if !self.verify_replay {
            return;
        }
        match self.declared.entry(Arc::clone(context)) {
            Entry::Vacant(entry) => {
                entry.insert(names);
            }
            Entry::Occupied(entry) => {
                if *entry.get() != names {
                    self.fatal.get_or_insert(EngineError::ReplayDivergence {
                        context: context.string_path(),
                        expected: entry.get().clone(),
                        actual: names,
                    });
                }
            }
        }
    }

    // ========================================================================
    // Visiting
    // ========================================================================

    pub(crate) fn visit_test(
        &mut self,
        container: &mut Container,
        name: String,
        options: TestOptions,
        source: SourceInfo,
        unit: TestUnit<'_>,
    ) {
        if self.excluded_by_tag(container, &options.tags) {
            return;
        }
        let path = ContextPath::new(&container.context, name);
        if !self.filter.should_run(&path) || !self.mark_processed(path.clone()) {
            return;
        }
        let test = TestDescription::new(&container.context, path.name.clone(), Some(source));
        let position = container.declaration_position();
        if let Some(reason) = options.ignored {
            self.record_ready(test, position, TestResult::Skipped { reason });
            return;
        }

        let isolation = container.context.isolation();
        if !container.ran_a_test || !isolation {
            container.ran_a_test = true;
            let cleanup = isolation.then(|| Arc::clone(&container.scope));
            let unit = unit(test.clone(), Arc::clone(&container.scope), isolation);
            self.schedule(test, position, unit, cleanup);
        } else {
            let scope = Arc::new(ResourceScope::new());
            let replay = SingleTestExecutor::with_scope(&self.root, path, Arc::clone(&scope));
            self.schedule(test, position, replay.execute().boxed(), Some(scope));
        }
    }

    pub(crate) fn visit_pending(&mut self, container: &Container, name: String, source: SourceInfo) {
        let path = ContextPath::new(&container.context, name);
        if !self.filter.should_run(&path) || !self.mark_processed(path.clone()) {
            return;
        }
        let test = TestDescription::new(&container.context, path.name, Some(source));
        self.record_ready(test, container.declaration_position(), TestResult::Pending);
    }

    pub(crate) fn visit_context<E: EnterContext>(
        &mut self,
        container: &mut Container,
        name: String,
        options: ContextOptions,
        source: SourceInfo,
        child: E,
    ) {
        if self.excluded_by_tag(container, &options.tags) {
            return;
        }
        let path = ContextPath::new(&container.context, name);
        if !self.filter.should_run(&path) || self.processed.contains(&path) {
            return;
        }
        let parent_isolation = container.context.isolation();
        if parent_isolation && container.ran_a_test {
            // reached again from the root in a later pass
            container.contexts_left = true;
            return;
        }

        let position = container.declaration_position();
        let isolation = parent_isolation && options.isolation != Some(false);
        let context = Context::child(&container.context, path.name.clone(), Some(source), isolation);
        if options.isolation == Some(true) && !parent_isolation {
            let error = EngineError::IsolationReenabled {
                context: context.string_path(),
            };
            self.record_failed_context(&context, path, position, source, error.into());
            return;
        }

        self.register_context(&context, position.clone());
        if let Some(reason) = options.ignored {
            self.mark_processed(path);
            let test = TestDescription::new(&context, format!("context ignored because {}", reason), Some(source));
            self.record_ready(test, position, TestResult::Skipped { reason });
            return;
        }

        let mut inner = Container::new(
            Arc::clone(&context),
            Arc::clone(&container.scope),
            container.execute_all || self.only_tag.is_some(),
            self.is_investigated(&context),
        );
        inner.position = position.clone();
        let (outcome, inner) = child.enter(Walk::Discover(&mut *self), inner);
        if self.fatal.is_some() {
            return;
        }
        if let Err(cause) = outcome {
            self.record_failed_context(&context, path, position, source, cause);
            container.ran_a_test = true;
            return;
        }

        self.verify_declared(&context, inner.declared);
        self.mark_investigated(&context);
        if inner.contexts_left {
            container.contexts_left = true;
        } else {
            self.mark_processed(path);
        }
        if inner.ran_a_test {
            container.ran_a_test = true;
        }
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Cancel every test scheduled for this root.
    pub(crate) fn abort_all(&self) {
        for deferred in self.tests.values() {
            deferred.abort();
        }
    }

    pub(crate) fn test_count(&self) -> usize {
        self.tests.len()
    }

    /// Results in declaration order.
    ///
    /// Passes reach tests declared after a deferred sibling context before
    /// the tests inside it, so the maps are sorted by declaration position.
    pub(crate) fn into_results(mut self, scopes: Vec<Arc<ResourceScope>>) -> TestResults {
        let context_positions = &self.context_positions;
        self.contexts
            .sort_by(|a, b| context_positions.get(a).cmp(&context_positions.get(b)));
        let test_positions = &self.test_positions;
        self.tests
            .sort_by(|a, _, b, _| test_positions.get(a).cmp(&test_positions.get(b)));
        TestResults {
            contexts: self.contexts.into_iter().collect(),
            tests: self.tests,
            after_suite: self.after_suite,
            scopes,
        }
    }
}
