//! Auto-association at store time and manual discovery afterwards.

use mnemo_core::manager::StoreOptions;
use mnemo_e2e_tests::TestEngine;
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[ignore = "requires model download"]
async fn storing_a_related_memory_links_it_to_similar_ones() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    let first = harness
        .engine
        .store("the mitochondria is the powerhouse of the cell", "facts/biology", vec![], None, Default::default(), &StoreOptions::default(), &cancel)
        .await
        .unwrap();

    let options = StoreOptions { association_min_weight: 0.0, ..StoreOptions::default() };
    let second = harness
        .engine
        .store("mitochondria generate atp for the cell", "facts/biology", vec![], None, Default::default(), &options, &cancel)
        .await
        .unwrap();

    assert!(second.associations_created.iter().any(|a| {
        (a.source_id == first.memory.id && a.target_id == second.memory.id)
            || (a.source_id == second.memory.id && a.target_id == first.memory.id)
    }));
}

#[tokio::test]
#[ignore = "requires model download"]
async fn get_with_associations_includes_linked_neighbours() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    let first = harness
        .engine
        .store("paris is the capital of france", "facts/geography", vec![], None, Default::default(), &StoreOptions::default(), &cancel)
        .await
        .unwrap();
    let options = StoreOptions { association_min_weight: 0.0, ..StoreOptions::default() };
    harness
        .engine
        .store("france's capital city is paris", "facts/geography", vec![], None, Default::default(), &options, &cancel)
        .await
        .unwrap();

    let result = harness.engine.get(&first.memory.id, true, 5, &cancel).await.unwrap();
    assert!(!result.associations.is_empty());
}

#[tokio::test]
#[ignore = "requires model download"]
async fn auto_associate_false_creates_no_links() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    let first = harness
        .engine
        .store("the mitochondria is the powerhouse of the cell", "facts/biology", vec![], None, Default::default(), &StoreOptions::default(), &cancel)
        .await
        .unwrap();
    let options = StoreOptions { auto_associate: false, ..StoreOptions::default() };
    let second = harness
        .engine
        .store("mitochondria generate atp for the cell", "facts/biology", vec![], None, Default::default(), &options, &cancel)
        .await
        .unwrap();

    assert!(second.associations_created.is_empty());
    let result = harness.engine.get(&first.memory.id, true, 5, &cancel).await.unwrap();
    assert!(result.associations.is_empty());
}

#[tokio::test]
#[ignore = "requires model download"]
async fn discover_associations_backfills_beyond_stored_edges() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    let target = harness
        .engine
        .store(
            "the mitochondria is the powerhouse of the cell",
            "facts/biology",
            vec![],
            None,
            Default::default(),
            &StoreOptions { auto_associate: false, ..StoreOptions::default() },
            &cancel,
        )
        .await
        .unwrap();
    harness
        .engine
        .store(
            "mitochondria generate atp for the cell",
            "facts/biology",
            vec![],
            None,
            Default::default(),
            &StoreOptions { auto_associate: false, allow_duplicates: true, ..StoreOptions::default() },
            &cancel,
        )
        .await
        .unwrap();

    let discovered = harness.engine.discover_associations(&target.memory.id, 5, 0.0, &cancel).await.unwrap();
    assert!(!discovered.is_empty());
}
