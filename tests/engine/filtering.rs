//! Filtering Tests
//!
//! Tests for tag filters and path filters. Filtered branches must not run
//! their context bodies at all.

use crate::common::*;
use nestrun::NoopListener;
use std::sync::Arc;

fn tagged_root(journal: Journal) -> RootContext {
    RootContext::new("root", move |ctx| {
        journal.push("root");
        ctx.test("untagged test", |_, ()| async {});
        ctx.test_with("tagged test", TestOptions::new().tag("single"), |_, ()| async {});
        let j = journal.clone();
        ctx.describe_with("tagged context", ContextOptions::new().tag("single"), move |ctx| {
            j.push("tagged context");
            ctx.test("test in tagged context", |_, ()| async {});
            ctx.describe("nested", |ctx| {
                ctx.test("deep test", |_, ()| async {});
            });
        });
        let j = journal.clone();
        ctx.describe("plain context", move |ctx| {
            j.push("plain context");
            ctx.test("plain test", |_, ()| async {});
        });
    })
}

// ============================================================================
// Tags
// ============================================================================

#[tokio::test]
async fn only_tagged_tests_and_contexts_run() {
    let journal = Journal::new();
    let suite = Suite::from_contexts(vec![tagged_root(journal.clone())]).unwrap();
    let result = suite.run(&tag_config("single")).await.unwrap();

    assert!(result.all_ok());
    assert_eq!(
        result_names(&result.tests),
        vec!["tagged test", "test in tagged context", "deep test"]
    );
    assert_eq!(journal.count("plain context"), 0);
    assert!(journal.count("tagged context") >= 1);
}

#[tokio::test]
async fn tagged_root_runs_everything() {
    let journal = Journal::new();
    let root = tagged_root(journal.clone()).with_tag("single");
    let suite = Suite::from_contexts(vec![root]).unwrap();
    let result = suite.run(&tag_config("single")).await.unwrap();

    assert!(result.all_ok());
    assert_eq!(result.tests.len(), 5);
    assert_eq!(journal.count("plain context"), 1);
}

#[tokio::test]
async fn unknown_tag_runs_nothing() {
    let suite = Suite::from_contexts(vec![typical_context()]).unwrap();
    let result = suite.run(&tag_config("nobody uses this")).await.unwrap();
    assert!(result.tests.is_empty());
    assert!(result.all_ok());
}

#[tokio::test]
async fn no_tag_runs_everything() {
    let journal = Journal::new();
    let suite = Suite::from_contexts(vec![tagged_root(journal)]).unwrap();
    let result = run(&suite).await;
    assert_eq!(result.tests.len(), 5);
}

// ============================================================================
// Paths
// ============================================================================

#[tokio::test]
async fn path_filter_runs_a_single_test() {
    let results = executed(discover(
        typical_context(),
        &filter_config("root context > test 1"),
        Arc::new(NoopListener),
    ));
    assert_eq!(test_names(&results), vec!["test 1"]);
    assert_eq!(context_names(&results.contexts), vec!["root context"]);
    results.await_all().await;
}

#[tokio::test]
async fn path_filter_rejecting_the_root_runs_nothing() {
    let journal = Journal::new();
    let results = executed(discover(
        tagged_root(journal.clone()),
        &filter_config("other root > untagged test"),
        Arc::new(NoopListener),
    ));
    assert!(results.tests.is_empty());
    assert!(results.contexts.is_empty());
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn path_filter_selects_a_whole_context() {
    let results = executed(discover(
        typical_context(),
        &filter_config("root context > context 1"),
        Arc::new(NoopListener),
    ));
    assert_eq!(test_names(&results), vec!["context 1 test", "test 3"]);
    assert_eq!(
        context_names(&results.contexts),
        vec!["root context", "context 1", "context 2"]
    );
    results.await_all().await;
}

#[tokio::test]
async fn filter_reaches_a_deep_test_only() {
    let journal = Journal::new();
    let j = journal.clone();
    let suite = Suite::from_fn(move |ctx| {
        j.push("root");
        let j = j.clone();
        ctx.test("test 1", |_, ()| async {});
        ctx.describe("child", move |ctx| {
            j.push("child");
            ctx.test("test 2", |_, ()| async {});
            ctx.test("test 3", |_, ()| async {});
            ctx.test("test 4", |_, ()| async {});
        });
        ctx.describe("sibling", |ctx| {
            ctx.test("test 5", |_, ()| async {});
        });
    });

    let result = suite.run(&filter_config("root > child > test 4")).await.unwrap();
    assert_eq!(result_names(&result.tests), vec!["test 4"]);
    assert!(result.all_ok());
    assert_eq!(context_names(&result.contexts), vec!["root", "child"]);
    // one discovery pass, no replays
    assert_eq!(journal.count("root"), 1);
    assert_eq!(journal.count("child"), 1);
}

#[tokio::test]
async fn filter_from_environment_style_string() {
    let config = RunConfig::default()
        .apply_overrides(|key| (key == "NESTRUN_FILTER").then(|| "root context✔context 3✔test 4".to_string()))
        .unwrap();
    let results = executed(discover(typical_context(), &config, Arc::new(NoopListener)));
    assert_eq!(test_names(&results), vec!["test 4"]);
    results.await_all().await;
}
