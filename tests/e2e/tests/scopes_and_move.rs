//! Scope-filtered listing and moving memories between scopes.

use mnemo_core::manager::StoreOptions;
use mnemo_core::store::Page;
use mnemo_core::ScopeFilter;
use mnemo_e2e_tests::TestEngine;
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[ignore = "requires model download"]
async fn prefix_filter_includes_descendant_scopes_only() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    harness
        .engine
        .store(
            "note one",
            "work/projects/mnemo",
            vec![],
            None,
            Default::default(),
            &StoreOptions { allow_duplicates: true, auto_associate: false, ..StoreOptions::default() },
            &cancel,
        )
        .await
        .unwrap();
    harness
        .engine
        .store(
            "note two",
            "work/personal",
            vec![],
            None,
            Default::default(),
            &StoreOptions { allow_duplicates: true, auto_associate: false, ..StoreOptions::default() },
            &cancel,
        )
        .await
        .unwrap();

    let filter = ScopeFilter::Prefix(mnemo_core::scope::parse("work/projects").unwrap());
    let result = harness.engine.list(&filter, &Page::first(50), &cancel).unwrap();

    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].scope, "work/projects/mnemo");
}

#[tokio::test]
#[ignore = "requires model download"]
async fn moving_a_memory_updates_its_listed_scope() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    let outcome = harness
        .engine
        .store("a memory that will relocate", "session/tmp", vec![], None, Default::default(), &StoreOptions::default(), &cancel)
        .await
        .unwrap();

    let results = harness.engine.move_memories(&[outcome.memory.id.clone()], "archive/2026", &cancel).await.unwrap();
    assert!(results[0].moved);
    assert!(results[0].error.is_none());

    let filter = ScopeFilter::Exact(mnemo_core::scope::parse("archive/2026").unwrap());
    let result = harness.engine.list(&filter, &Page::first(50), &cancel).unwrap();
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].id, outcome.memory.id);
}

#[tokio::test]
#[ignore = "requires model download"]
async fn moving_an_unknown_id_reports_a_per_id_error() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    let results = harness.engine.move_memories(&["not-a-real-id".to_string()], "archive/2026", &cancel).await.unwrap();
    assert!(!results[0].moved);
    assert!(results[0].error.is_some());
}

#[test]
fn scope_canonicalisation_trims_and_normalises() {
    let canonical = mnemo_core::scope::canonical("/work/Projects/../notes//").ok();
    // Whatever the exact normalisation, repeated canonicalisation must be idempotent.
    if let Some(first) = canonical {
        let second = mnemo_core::scope::canonical(&first).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn is_ancestor_matches_equal_and_descendant_scopes() {
    assert!(mnemo_core::scope::is_ancestor("work", "work"));
    assert!(mnemo_core::scope::is_ancestor("work", "work/projects/mnemo"));
    assert!(!mnemo_core::scope::is_ancestor("work", "personal"));
    assert!(!mnemo_core::scope::is_ancestor("work/projects", "work"));
}
