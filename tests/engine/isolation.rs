//! Isolation Tests
//!
//! Tests that isolated tests see freshly re-run setup, that contexts
//! without isolation share one setup, and that resources and given values
//! follow the same rules.

use crate::common::*;
use nestrun::NoopListener;
use std::sync::Arc;

// ============================================================================
// Replays
// ============================================================================

#[tokio::test]
async fn isolated_tests_do_not_see_each_others_side_effects() {
    let journal = Journal::new();
    let j = journal.clone();
    let root = RootContext::new("root", move |ctx| {
        let state = Arc::new(parking_lot::Mutex::new(Vec::<&'static str>::new()));
        for name in ["first", "second", "third"] {
            let state = Arc::clone(&state);
            let j = j.clone();
            ctx.test(name, move |_, ()| async move {
                state.lock().push(name);
                j.push(format!("{} saw {:?}", name, *state.lock()));
            });
        }
    });

    let result = run(&Suite::from_contexts(vec![root]).unwrap()).await;
    assert!(result.all_ok());
    let mut entries = journal.entries();
    entries.sort();
    assert_eq!(
        entries,
        vec![
            "first saw [\"first\"]",
            "second saw [\"second\"]",
            "third saw [\"third\"]"
        ]
    );
}

#[tokio::test]
async fn context_bodies_run_once_per_isolated_test() {
    let journal = Journal::new();
    let j = journal.clone();
    let root = RootContext::new("root", move |ctx| {
        j.push("root");
        let j = j.clone();
        ctx.describe("child", move |ctx| {
            j.push("child");
            ctx.test("a", |_, ()| async {});
            ctx.test("b", |_, ()| async {});
        });
    });

    let result = run(&Suite::from_contexts(vec![root]).unwrap()).await;
    assert!(result.all_ok());
    // one discovery pass plus one replay for "b"
    assert_eq!(journal.count("root"), 2);
    assert_eq!(journal.count("child"), 2);
}

#[tokio::test]
async fn contexts_without_isolation_run_once() {
    let journal = Journal::new();
    let j = journal.clone();
    let root = RootContext::new("root", move |ctx| {
        j.push("root");
        let j = j.clone();
        ctx.describe("child", move |ctx| {
            j.push("child");
            ctx.test("a", |_, ()| async {});
            ctx.test("b", |_, ()| async {});
        });
        ctx.test("c", |_, ()| async {});
    })
    .with_isolation(false);

    let result = run(&Suite::from_contexts(vec![root]).unwrap()).await;
    assert!(result.all_ok());
    assert_eq!(result.tests.len(), 3);
    assert_eq!(journal.count("root"), 1);
    assert_eq!(journal.count("child"), 1);
}

#[tokio::test]
async fn isolation_can_be_turned_off_for_a_subtree() {
    let journal = Journal::new();
    let j = journal.clone();
    let root = RootContext::new("root", move |ctx| {
        j.push("root");
        let j = j.clone();
        ctx.describe_with("shared", ContextOptions::new().isolation(false), move |ctx| {
            j.push("shared");
            ctx.test("a", |_, ()| async {});
            ctx.test("b", |_, ()| async {});
            ctx.describe("nested", |ctx| {
                assert!(!ctx.context().isolation());
                ctx.test("c", |_, ()| async {});
            });
        });
    });

    let result = run(&Suite::from_contexts(vec![root]).unwrap()).await;
    assert!(result.all_ok());
    assert_eq!(result_names(&result.tests), vec!["a", "b", "c"]);
    assert_eq!(journal.count("shared"), 1);
}

// ============================================================================
// Resources
// ============================================================================

fn resource_root(isolation: bool, created: Counter, closed: Counter) -> RootContext {
    RootContext::new("root", move |ctx| {
        created.bump();
        let closed = closed.clone();
        ctx.auto_close("resource", move |_| closed.bump());
        ctx.test("test 1", |_, ()| async {});
        ctx.test("test 2", |_, ()| async {});
        ctx.describe("child", |ctx| {
            ctx.test("test 3", |_, ()| async {});
        });
    })
    .with_isolation(isolation)
}

#[tokio::test]
async fn isolated_tests_get_their_own_resources() {
    let created = Counter::new();
    let closed = Counter::new();
    let root = resource_root(true, created.clone(), closed.clone());

    let result = run(&Suite::from_contexts(vec![root]).unwrap()).await;
    assert!(result.all_ok());
    // one discovery pass per test that is not replayed, one replay per other test
    assert_eq!(created.get(), closed.get());
    assert!(created.get() >= 3);
}

#[tokio::test]
async fn shared_resources_are_created_once_and_closed_after_the_suite() {
    let created = Counter::new();
    let closed = Counter::new();
    let root = resource_root(false, created.clone(), closed.clone());

    let results = executed(discover(root, &config(), Arc::new(NoopListener)));
    results.await_all().await;
    assert_eq!(created.get(), 1);
    assert_eq!(closed.get(), 0);

    results.close_resources().unwrap();
    assert_eq!(closed.get(), 1);
}

#[tokio::test]
async fn resources_are_closed_in_reverse_order() {
    let journal = Journal::new();
    let j = journal.clone();
    let root = RootContext::new("root", move |ctx| {
        for name in ["first", "second", "third"] {
            let j = j.clone();
            ctx.auto_close(name, move |name| j.push(*name));
        }
        ctx.test("test", |_, ()| async {});
    });

    let result = run(&Suite::from_contexts(vec![root]).unwrap()).await;
    assert!(result.all_ok());
    assert_eq!(journal.entries(), vec!["third", "second", "first"]);
}

#[tokio::test]
async fn test_resources_are_closed_after_the_test() {
    let closed = Counter::new();
    let c = closed.clone();
    let root = RootContext::new("root", move |ctx| {
        let c = c.clone();
        ctx.test("uses a resource", move |test, ()| async move {
            let resource = test.auto_close(7u32, move |_| c.bump());
            assert_eq!(*resource, 7);
        });
    });

    let result = run(&Suite::from_contexts(vec![root]).unwrap()).await;
    assert!(result.all_ok());
    assert_eq!(closed.get(), 1);
}

#[tokio::test]
async fn after_each_sees_every_result() {
    let journal = Journal::new();
    let j = journal.clone();
    let root = RootContext::new("root", move |ctx| {
        let j = j.clone();
        ctx.after_each(move |test: TestDescription, result: TestResult| {
            let j = j.clone();
            async move {
                j.push(format!("{}: {}", test.test_name, result.is_success()));
            }
        });
        ctx.test("passes", |_, ()| async {});
        ctx.test("fails", |_, ()| async { Err::<(), _>(anyhow::anyhow!("broken")) });
    });

    let result = run(&Suite::from_contexts(vec![root]).unwrap()).await;
    assert_eq!(result.failed_tests().len(), 1);
    let mut entries = journal.entries();
    entries.sort();
    assert_eq!(entries, vec!["fails: false", "passes: true"]);
}

#[tokio::test]
async fn failing_closer_fails_a_successful_test() {
    let root = RootContext::new("root", |ctx| {
        ctx.auto_close((), |_| Err::<(), _>(anyhow::anyhow!("cannot close")));
        ctx.test("test", |_, ()| async {});
    });

    let result = run(&Suite::from_contexts(vec![root]).unwrap()).await;
    let test = result.find("root > test").unwrap();
    assert_eq!(test.result.cause().unwrap().to_string(), "cannot close");
}

// ============================================================================
// Given chains
// ============================================================================

#[tokio::test]
async fn given_values_are_chained_from_the_root() {
    let journal = Journal::new();
    let j = journal.clone();
    let root = RootContext::new("root", move |ctx| {
        let j = j.clone();
        ctx.describe_given(
            "outer",
            |()| async { Ok::<_, anyhow::Error>(20u32) },
            move |ctx| {
                let j = j.clone();
                ctx.test("sees outer", {
                    let j = j.clone();
                    move |_, given: u32| async move { j.push(format!("outer {}", given)) }
                });
                ctx.describe_given(
                    "inner",
                    |outer: u32| async move { Ok::<_, anyhow::Error>(format!("{}+1", outer)) },
                    move |ctx| {
                        ctx.test("sees inner", move |_, given: String| async move {
                            j.push(format!("inner {}", given))
                        });
                    },
                );
            },
        );
    });

    let result = run(&Suite::from_contexts(vec![root]).unwrap()).await;
    assert!(result.all_ok());
    let mut entries = journal.entries();
    entries.sort();
    assert_eq!(entries, vec!["inner 20+1", "outer 20"]);
}

#[tokio::test]
async fn given_is_evaluated_for_every_test() {
    let produced = Counter::new();
    let p = produced.clone();
    let root = RootContext::new("root", move |ctx| {
        let p = p.clone();
        ctx.describe_given(
            "context",
            move |()| {
                let p = p.clone();
                async move {
                    p.bump();
                    Ok::<_, anyhow::Error>(())
                }
            },
            |ctx| {
                ctx.test("a", |_, ()| async {});
                ctx.test("b", |_, ()| async {});
                ctx.test("c", |_, ()| async {});
            },
        );
    })
    .with_isolation(false);

    let result = run(&Suite::from_contexts(vec![root]).unwrap()).await;
    assert!(result.all_ok());
    assert_eq!(produced.get(), 3);
}

#[tokio::test]
async fn failing_given_fails_the_test() {
    let root = RootContext::new("root", |ctx| {
        ctx.describe_given(
            "context",
            |()| async { Err::<u32, _>(anyhow::anyhow!("no database")) },
            |ctx| {
                ctx.test("needs the database", |_, _db: u32| async {});
            },
        );
    });

    let result = run(&Suite::from_contexts(vec![root]).unwrap()).await;
    let test = result.find("root > context > needs the database").unwrap();
    assert_eq!(test.result.cause().unwrap().to_string(), "no database");
}
