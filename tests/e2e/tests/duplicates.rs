//! Near-duplicate content is caught at store time.

use mnemo_core::manager::StoreOptions;
use mnemo_core::{dedup, MnemoError};
use mnemo_e2e_tests::TestEngine;
use tokio_util::sync::CancellationToken;

#[test]
fn identical_content_hashes_identically_regardless_of_whitespace() {
    let a = dedup::hash_of("the quick brown fox");
    let b = dedup::hash_of("  the   quick brown   fox  ");
    assert_eq!(a, b);
}

#[test]
fn different_content_hashes_differently() {
    let a = dedup::hash_of("the quick brown fox");
    let b = dedup::hash_of("the slow red fox");
    assert_ne!(a, b);
}

#[tokio::test]
#[ignore = "requires model download"]
async fn exact_duplicate_is_rejected_by_default() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    harness
        .engine
        .store("the mitochondria is the powerhouse of the cell", "facts/biology", vec![], None, Default::default(), &StoreOptions::default(), &cancel)
        .await
        .unwrap();

    let result = harness
        .engine
        .store("the mitochondria is the powerhouse of the cell", "facts/biology", vec![], None, Default::default(), &StoreOptions::default(), &cancel)
        .await;

    match result {
        Err(MnemoError::DuplicateRejected { .. }) => {}
        other => panic!("expected DuplicateRejected, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires model download"]
async fn exact_duplicate_is_allowed_when_opted_in() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    let options = StoreOptions { allow_duplicates: true, ..StoreOptions::default() };
    harness
        .engine
        .store("the mitochondria is the powerhouse of the cell", "facts/biology", vec![], None, Default::default(), &options, &cancel)
        .await
        .unwrap();
    let second = harness
        .engine
        .store("the mitochondria is the powerhouse of the cell", "facts/biology", vec![], None, Default::default(), &options, &cancel)
        .await
        .unwrap();

    assert!(!second.memory.id.is_empty());
}

#[tokio::test]
#[ignore = "requires model download"]
async fn near_duplicate_is_rejected_above_similarity_threshold() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    harness
        .engine
        .store("the mitochondria is the powerhouse of the cell", "facts/biology", vec![], None, Default::default(), &StoreOptions::default(), &cancel)
        .await
        .unwrap();

    let options = StoreOptions { duplicate_threshold: Some(0.05), ..StoreOptions::default() };
    let result = harness
        .engine
        .store("mitochondria: the cell's powerhouse", "facts/biology", vec![], None, Default::default(), &options, &cancel)
        .await;

    match result {
        Err(MnemoError::DuplicateRejected { .. }) => {}
        other => panic!("expected DuplicateRejected at a permissive threshold, got {other:?}"),
    }
}
