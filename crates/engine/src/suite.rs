//! Suite aggregation
//!
//! A suite collects root contexts from its providers, discovers each of
//! them, awaits every deferred result and finally runs the teardown: the
//! after-suite callbacks, then the shared resource scopes.

use crate::config::RunConfig;
use crate::dsl::ContextDsl;
use crate::outcome::IntoOutcome;
use crate::root::{RootContext, RootContextExecutor, RootContextResult, TestResults};
use crate::scheduler::{DeferredResult, TestScheduler};
use futures::future::join_all;
use nestrun_core::{
    parse_filter_string, Context, ExecutionListener, FailureCause, NoopListener, SuiteError,
    TestPlusResult,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Source of root contexts.
pub trait ContextProvider: Send + Sync {
    /// The root contexts this provider contributes.
    fn contexts(&self) -> Vec<RootContext>;
}

impl ContextProvider for RootContext {
    fn contexts(&self) -> Vec<RootContext> {
        vec![self.clone()]
    }
}

impl ContextProvider for Vec<RootContext> {
    fn contexts(&self) -> Vec<RootContext> {
        self.clone()
    }
}

/// An ordered, non-empty list of context providers.
pub struct Suite {
    providers: Vec<Box<dyn ContextProvider>>,
}

impl Suite {
    /// Create a suite from its providers.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::EmptySuite`] when `providers` is empty.
    pub fn new(providers: Vec<Box<dyn ContextProvider>>) -> Result<Self, SuiteError> {
        if providers.is_empty() {
            return Err(SuiteError::EmptySuite);
        }
        Ok(Self { providers })
    }

    /// Create a suite with one provider per root context.
    pub fn from_contexts(contexts: impl IntoIterator<Item = RootContext>) -> Result<Self, SuiteError> {
        Self::new(
            contexts
                .into_iter()
                .map(|context| Box::new(context) as Box<dyn ContextProvider>)
                .collect(),
        )
    }

    /// A suite with a single root context named `root`.
    #[track_caller]
    pub fn from_fn<F, R>(body: F) -> Self
    where
        F: Fn(&mut ContextDsl<'_, ()>) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        Self {
            providers: vec![Box::new(RootContext::new("root", body))],
        }
    }

    /// Root contexts sorted by order, with duplicate names made unique.
    fn root_contexts(&self) -> Vec<RootContext> {
        let mut roots: Vec<RootContext> = self
            .providers
            .iter()
            .flat_map(|provider| provider.contexts())
            .collect();
        roots.sort_by_key(RootContext::order);

        let mut used = HashSet::new();
        roots
            .into_iter()
            .map(|root| {
                if used.insert(root.name().to_string()) {
                    return root;
                }
                let mut suffix = 1;
                loop {
                    let name = format!("{}-{}", root.name(), suffix);
                    if used.insert(name.clone()) {
                        return root.renamed(name);
                    }
                    suffix += 1;
                }
            })
            .collect()
    }

    /// Discover every root context and start its tests.
    ///
    /// Returns as soon as discovery is done. In eager mode the tests are
    /// already running on the tokio runtime; in lazy mode they run when
    /// their deferred results are awaited.
    pub fn find_and_start_tests(
        &self,
        config: &RunConfig,
        listener: Arc<dyn ExecutionListener>,
    ) -> Vec<RootContextResult> {
        let scheduler = Arc::new(TestScheduler::new(
            config.lazy,
            config.timeout(),
            config.parallelism(),
            Arc::clone(&listener),
        ));
        let filter = config.test_filter();
        self.root_contexts()
            .iter()
            .map(|root| {
                RootContextExecutor {
                    root,
                    scheduler: Arc::clone(&scheduler),
                    filter: Arc::clone(&filter),
                    only_tag: config.only_tag.clone(),
                    listener: Arc::clone(&listener),
                    verify_replay: config.verify_replay,
                }
                .execute()
            })
            .collect()
    }

    /// Run the suite to completion.
    pub async fn run(&self, config: &RunConfig) -> Result<SuiteResult, SuiteError> {
        self.run_with_listener(config, Arc::new(NoopListener)).await
    }

    /// Run the suite to completion, reporting events to `listener`.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::WatchdogExpired`] when the configured watchdog
    /// fires before every test has finished.
    pub async fn run_with_listener(
        &self,
        config: &RunConfig,
        listener: Arc<dyn ExecutionListener>,
    ) -> Result<SuiteResult, SuiteError> {
        let mut contexts = Vec::new();
        let mut failed_roots = Vec::new();
        let mut executed: Vec<TestResults> = Vec::new();
        for result in self.find_and_start_tests(config, listener) {
            match result {
                RootContextResult::Executed(results) => {
                    contexts.extend(results.contexts.iter().cloned());
                    executed.push(results);
                }
                RootContextResult::Failed { context, failure } => {
                    contexts.push(Arc::clone(&context));
                    failed_roots.push(FailedRootContext { context, failure });
                }
            }
        }

        let deferred: Vec<DeferredResult> = executed
            .iter()
            .flat_map(|results| results.tests.values().cloned())
            .collect();
        let after_suite: Vec<_> = executed
            .iter_mut()
            .flat_map(|results| results.after_suite.drain(..))
            .collect();
        debug!(target: "nestrun::suite", tests = deferred.len(), roots = executed.len(), "awaiting tests");

        let all = join_all(deferred.iter().cloned());
        let tests = match config.watchdog() {
            Some(limit) => match tokio::time::timeout(limit, all).await {
                Ok(tests) => tests,
                Err(_) => {
                    let pending: Vec<String> = deferred
                        .iter()
                        .filter(|d| d.peek().is_none())
                        .map(|d| d.test().to_string())
                        .collect();
                    for test in &pending {
                        warn!(target: "nestrun::suite", test = %test, "test still running when the watchdog expired");
                    }
                    for d in &deferred {
                        d.abort();
                    }
                    for results in &executed {
                        if let Err(cause) = results.close_resources() {
                            warn!(target: "nestrun::suite", error = %cause, "closing resources failed");
                        }
                    }
                    error!(target: "nestrun::suite", pending = pending.len(), "watchdog expired");
                    return Err(SuiteError::WatchdogExpired {
                        timeout_ms: limit.as_millis() as u64,
                        pending,
                    });
                }
            },
            None => all.await,
        };

        let mut teardown_failures = Vec::new();
        for callback in after_suite {
            if let Err(cause) = callback().await {
                warn!(target: "nestrun::suite", error = %cause, "after suite callback failed");
                teardown_failures.push(cause);
            }
        }
        for results in &executed {
            if let Err(cause) = results.close_resources() {
                warn!(target: "nestrun::suite", error = %cause, "closing resources failed");
                teardown_failures.push(cause);
            }
        }

        let result = SuiteResult {
            contexts,
            tests,
            failed_roots,
            teardown_failures,
        };
        info!(
            target: "nestrun::suite",
            tests = result.tests.len(),
            failed = result.failed_tests().len(),
            failed_roots = result.failed_roots.len(),
            "suite finished"
        );
        Ok(result)
    }
}

/// A root context whose discovery failed.
#[derive(Debug, Clone)]
pub struct FailedRootContext {
    /// The root context
    pub context: Arc<Context>,
    /// Why it failed
    pub failure: FailureCause,
}

/// Outcome of a complete suite run.
#[derive(Debug, Clone)]
pub struct SuiteResult {
    /// Every discovered context, root by root in first-discovery order
    pub contexts: Vec<Arc<Context>>,
    /// Every test result, in discovery order
    pub tests: Vec<TestPlusResult>,
    /// Roots that failed as a whole
    pub failed_roots: Vec<FailedRootContext>,
    /// Failures of after-suite callbacks and shared resource closers
    pub teardown_failures: Vec<FailureCause>,
}

impl SuiteResult {
    /// True when no test, root or teardown failed.
    pub fn all_ok(&self) -> bool {
        self.failed_roots.is_empty()
            && self.teardown_failures.is_empty()
            && !self.tests.iter().any(TestPlusResult::is_failure)
    }

    /// The failed tests, in discovery order.
    pub fn failed_tests(&self) -> Vec<&TestPlusResult> {
        self.tests.iter().filter(|t| t.is_failure()).collect()
    }

    /// Look up a test by its path, e.g. `root > child > test`.
    pub fn find(&self, path: &str) -> Option<&TestPlusResult> {
        let names = parse_filter_string(path);
        self.tests
            .iter()
            .find(|t| t.test.context_path().names() == names)
    }
}
