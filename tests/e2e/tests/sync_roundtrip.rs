//! Export/import round-trips under each merge strategy.

use mnemo_core::manager::StoreOptions;
use mnemo_core::sync::MergeStrategy;
use mnemo_core::ScopeFilter;
use mnemo_e2e_tests::TestEngine;
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[ignore = "requires model download"]
async fn export_then_import_into_a_fresh_engine_recreates_every_record() {
    let source = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    source.seed_facts("work/notes", 5).await;

    let payload = source.engine.export(&ScopeFilter::Any, true, &cancel).await.unwrap();
    assert_eq!(payload.memories.len(), 5);

    let dest = TestEngine::new_in_memory();
    let report = dest.engine.import(&payload, MergeStrategy::CreateVersions, None, &cancel).await.unwrap();

    assert_eq!(report.created, 5);
    assert_eq!(report.failed, 0);

    let listed = dest.engine.list(&ScopeFilter::Any, &mnemo_core::store::Page::first(50), &cancel).unwrap();
    assert_eq!(listed.items.len(), 5);
}

#[tokio::test]
#[ignore = "requires model download"]
async fn import_with_scope_prefix_nests_every_record_under_it() {
    let source = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    source.seed_facts("notes", 2).await;
    let payload = source.engine.export(&ScopeFilter::Any, false, &cancel).await.unwrap();

    let dest = TestEngine::new_in_memory();
    dest.engine.import(&payload, MergeStrategy::CreateVersions, Some("imported/batch-1"), &cancel).await.unwrap();

    let filter = ScopeFilter::Prefix(mnemo_core::scope::parse("imported/batch-1").unwrap());
    let listed = dest.engine.list(&filter, &mnemo_core::store::Page::first(50), &cancel).unwrap();
    assert_eq!(listed.items.len(), 2);
}

#[tokio::test]
#[ignore = "requires model download"]
async fn skip_duplicates_leaves_existing_records_untouched() {
    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    let outcome = harness
        .engine
        .store("a memory present on both sides", "work/notes", vec![], None, Default::default(), &StoreOptions::default(), &cancel)
        .await
        .unwrap();

    let payload = harness.engine.export(&ScopeFilter::Any, false, &cancel).await.unwrap();
    let report = harness.engine.import(&payload, MergeStrategy::SkipDuplicates, None, &cancel).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.created, 0);
    let fetched = harness.engine.get(&outcome.memory.id, false, 0, &cancel).await.unwrap();
    assert_eq!(fetched.memory.content, "a memory present on both sides");
}

#[tokio::test]
async fn import_of_dangling_associations_is_reported() {
    use chrono::Utc;
    use mnemo_core::sync::{ExportAssociation, ExportPayload, EXPORT_SCHEMA_VERSION};
    use mnemo_core::AssociationKind;

    let harness = TestEngine::new_in_memory();
    let cancel = CancellationToken::new();
    let payload = ExportPayload {
        schema_version: EXPORT_SCHEMA_VERSION,
        exported_at: Utc::now(),
        scope_filter: ScopeFilter::Any,
        memories: Vec::new(),
        associations: vec![ExportAssociation {
            source_id: "ghost-a".to_string(),
            target_id: "ghost-b".to_string(),
            weight: 0.9,
            kind: AssociationKind::Auto,
            created_at: Utc::now(),
        }],
    };

    let report = harness.engine.import(&payload, MergeStrategy::CreateVersions, None, &cancel).await.unwrap();
    assert_eq!(report.associations_dropped, 1);
    assert_eq!(report.associations_created, 0);
}
