//! Shared test utilities for the integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use nestrun::{
    Context, ContextOptions, ContextPath, EngineError, ExecutionListener, FailureCause,
    RootContext, RootContextResult, RunConfig, Suite, SuiteError, SuiteResult, TestDescription,
    TestOptions, TestPlusResult, TestResult, TestResults, ERROR_IN_CONTEXT,
};

// ============================================================================
// Configuration
// ============================================================================

/// Default config with replay verification on regardless of build profile.
///
/// Parallelism is fixed so runs do not depend on the host's core count.
pub fn config() -> RunConfig {
    RunConfig {
        verify_replay: true,
        parallelism: Some(4),
        ..RunConfig::default()
    }
}

pub fn lazy_config() -> RunConfig {
    RunConfig {
        lazy: true,
        ..config()
    }
}

pub fn tag_config(tag: &str) -> RunConfig {
    RunConfig {
        only_tag: Some(tag.to_string()),
        ..config()
    }
}

pub fn filter_config(filter: &str) -> RunConfig {
    RunConfig {
        filter: Some(filter.to_string()),
        ..config()
    }
}

// ============================================================================
// Recording
// ============================================================================

/// Listener that records every event as a line of text.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Only the discovery events.
    pub fn discovered(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with("CONTEXT ") || e.starts_with("TEST "))
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

impl ExecutionListener for RecordingListener {
    fn test_discovered(&self, test: &TestDescription) {
        self.events.lock().push(format!("TEST {}", test.test_name));
    }

    fn context_discovered(&self, context: &Context) {
        self.events.lock().push(format!("CONTEXT {}", context.name()));
    }

    fn test_started(&self, test: &TestDescription) {
        self.events.lock().push(format!("STARTED {}", test.test_name));
    }

    fn test_finished(&self, test: &TestDescription, _result: &TestResult) {
        self.events.lock().push(format!("FINISHED {}", test.test_name));
    }
}

/// Shared log of side effects performed by context and test bodies.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == entry).count()
    }
}

#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A root context exercising tests, an ignored test, a failing test and
/// nested contexts.
pub fn typical_context() -> RootContext {
    RootContext::new("root context", |ctx| {
        ctx.test("test 1", |_, ()| async {
            tokio::time::sleep(Duration::from_millis(1)).await;
        });
        ctx.test("test 2", |_, ()| async {
            tokio::time::sleep(Duration::from_millis(1)).await;
        });
        ctx.test_with("ignored test", TestOptions::new().ignored("testing"), |_, ()| async {});
        ctx.test("failed test", |_, ()| async { Err::<(), _>(anyhow::anyhow!("assertion failed")) });
        ctx.describe("context 1", |ctx| {
            ctx.test("context 1 test", |_, ()| async {});
            ctx.describe("context 2", |ctx| {
                ctx.test("test 3", |_, ()| async {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                });
            });
        });
        ctx.describe("context 3", |ctx| {
            ctx.test("test 4", |_, ()| async {
                tokio::time::sleep(Duration::from_millis(1)).await;
            });
        });
    })
}

/// Discover `root` alone and return its results.
pub fn discover(root: RootContext, config: &RunConfig, listener: Arc<dyn ExecutionListener>) -> RootContextResult {
    let suite = Suite::from_contexts(vec![root]).unwrap();
    suite.find_and_start_tests(config, listener).pop().unwrap()
}

pub fn executed(result: RootContextResult) -> TestResults {
    match result {
        RootContextResult::Executed(results) => results,
        RootContextResult::Failed { context, failure } => {
            panic!("root context {} failed: {}", context, failure)
        }
    }
}

pub fn test_names(results: &TestResults) -> Vec<String> {
    results.tests.keys().map(|t| t.test_name.clone()).collect()
}

pub fn context_names(contexts: &[Arc<Context>]) -> Vec<String> {
    contexts.iter().map(|c| c.name().to_string()).collect()
}

pub fn result_names(results: &[TestPlusResult]) -> Vec<String> {
    results.iter().map(|r| r.test.test_name.clone()).collect()
}

pub async fn run(suite: &Suite) -> SuiteResult {
    suite.run(&config()).await.unwrap()
}
