//! Storing memories and finding them again by semantic similarity.

use mnemo_core::manager::StoreOptions;
use mnemo_core::search::{SearchMode, SearchOptions};
use mnemo_core::ScopeFilter;
use mnemo_e2e_tests::TestEngine;
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[ignore = "requires model download"]
async fn stored_memory_is_found_by_its_own_content() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    let outcome = harness
        .engine
        .store(
            "the mitochondria is the powerhouse of the cell",
            "facts/biology",
            vec!["cell-biology".to_string()],
            None,
            Default::default(),
            &StoreOptions::default(),
            &cancel,
        )
        .await
        .unwrap();

    let options = SearchOptions::new(ScopeFilter::Any, 0.1);
    let hits = harness.engine.search("mitochondria powerhouse", &options, &cancel).await.unwrap();

    assert!(hits.iter().any(|h| h.memory.id == outcome.memory.id));
    assert!(hits[0].score > 0.0);
}

#[tokio::test]
#[ignore = "requires model download"]
async fn search_limit_is_respected() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    harness.seed_facts("work/notes", 20).await;

    let mut options = SearchOptions::new(ScopeFilter::Any, 0.0);
    options.limit = 5;
    let hits = harness.engine.search("test memory content", &options, &cancel).await.unwrap();

    assert!(hits.len() <= 5);
}

#[tokio::test]
#[ignore = "requires model download"]
async fn diversified_search_avoids_near_duplicate_results() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    // Near-identical phrasing, all should cluster together semantically.
    for i in 0..10 {
        harness
            .engine
            .store(
                &format!("the quick brown fox jumps over the lazy dog number {i}"),
                "work/notes",
                vec![],
                None,
                Default::default(),
                &StoreOptions { allow_duplicates: true, auto_associate: false, ..StoreOptions::default() },
                &cancel,
            )
            .await
            .unwrap();
    }
    harness
        .engine
        .store(
            "an entirely unrelated memory about astronomy and black holes",
            "work/notes",
            vec![],
            None,
            Default::default(),
            &StoreOptions::default(),
            &cancel,
        )
        .await
        .unwrap();

    let mut options = SearchOptions::new(ScopeFilter::Any, 0.0);
    options.limit = 3;
    options.mode = SearchMode::Diversified;
    let hits = harness.engine.search("quick brown fox", &options, &cancel).await.unwrap();

    assert!(hits.len() <= 3);
}

#[tokio::test]
async fn search_rejects_out_of_range_limit() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    let mut options = SearchOptions::new(ScopeFilter::Any, 0.1);
    options.limit = 0;
    let result = harness.engine.search("anything", &options, &cancel).await;
    assert!(result.is_err());
}
