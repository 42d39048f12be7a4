//! Sync engine (C9): export to a portable payload, import with configurable merge
//! behaviour.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{check_cancelled, MnemoError, Result};
use crate::manager::{MemoryManager, StoreOptions};
use crate::model::AssociationKind;
use crate::scope::{self, ScopeFilter};
use crate::store::Page;
use crate::value::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord {
    pub id: String,
    pub content: String,
    pub scope: String,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub metadata: Metadata,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportAssociation {
    pub source_id: String,
    pub target_id: String,
    pub weight: f32,
    pub kind: AssociationKind,
    pub created_at: DateTime<Utc>,
}

/// Current export payload schema version. Bump whenever a field is added, removed or
/// reinterpreted in a way an older importer couldn't tolerate.
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPayload {
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    pub scope_filter: ScopeFilter,
    pub memories: Vec<ExportRecord>,
    pub associations: Vec<ExportAssociation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Leave an existing record (matched by id) untouched.
    SkipDuplicates,
    /// Replace an existing record (matched by id) in place.
    Overwrite,
    /// Always insert under a freshly generated id, even if the source id exists.
    CreateVersions,
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub created: usize,
    pub skipped: usize,
    pub overwritten: usize,
    pub failed: usize,
    pub associations_created: usize,
    pub associations_dropped: usize,
}

/// Export every record matching `scope_filter`, sourced from the same C3 pagination
/// `list` uses, so export and list never disagree about what a scope contains.
pub async fn export(manager: &MemoryManager, scope_filter: &ScopeFilter, include_associations: bool, cancel: &CancellationToken) -> Result<ExportPayload> {
    let mut memories = Vec::new();
    let mut page = Page::first(500);
    loop {
        check_cancelled(cancel)?;
        let result = manager.list(scope_filter, &page, cancel)?;
        if result.items.is_empty() {
            break;
        }
        memories.extend(result.items.iter().map(|m| ExportRecord {
            id: m.id.clone(),
            content: m.content.clone(),
            scope: m.scope.clone(),
            tags: m.tags.clone(),
            category: m.category.clone(),
            metadata: m.metadata.clone(),
            content_hash: m.content_hash.clone(),
            created_at: m.created_at,
            updated_at: m.updated_at,
        }));
        match result.next_cursor {
            Some(cursor) => page = Page { limit: page.limit, cursor: Some(cursor) },
            None => break,
        }
    }

    let associations = if include_associations {
        let ids: std::collections::HashSet<String> = memories.iter().map(|r| r.id.clone()).collect();
        manager
            .graph()
            .read()
            .await
            .edges_among(&ids)
            .into_iter()
            .map(|e| ExportAssociation {
                source_id: e.source_id,
                target_id: e.target_id,
                weight: e.weight,
                kind: e.kind,
                created_at: e.created_at,
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(ExportPayload {
        schema_version: EXPORT_SCHEMA_VERSION,
        exported_at: Utc::now(),
        scope_filter: scope_filter.clone(),
        memories,
        associations,
    })
}

/// Import `payload` under `merge_strategy`, remapping `scope_prefix` onto every record's
/// scope and remapping association endpoints to whatever id each record ended up under.
/// Associations referencing a record that failed or was skipped are dropped and
/// counted, never silently kept dangling.
pub async fn import(
    manager: &MemoryManager,
    payload: &ExportPayload,
    merge_strategy: MergeStrategy,
    scope_prefix: Option<&str>,
    cancel: &CancellationToken,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    let mut id_map: HashMap<String, String> = HashMap::new();

    for record in &payload.memories {
        check_cancelled(cancel)?;
        let target_scope = match scope_prefix {
            Some(prefix) => format!("{}/{}", scope::canonical(prefix)?, record.scope),
            None => record.scope.clone(),
        };
        let target_scope = scope::canonical(&target_scope)?;

        let existing_by_id = manager.metadata_store().get(&record.id).map_err(|e| {
            MnemoError::state_inconsistency(format!("metadata lookup failed during import: {e}"))
        })?;

        match merge_strategy {
            MergeStrategy::SkipDuplicates => {
                if existing_by_id.is_some() {
                    report.skipped += 1;
                    id_map.insert(record.id.clone(), record.id.clone());
                    continue;
                }
                if let Some(duplicate_id) = find_content_duplicate(manager, &record.content_hash, &target_scope)? {
                    report.skipped += 1;
                    id_map.insert(record.id.clone(), duplicate_id);
                    continue;
                }
                match store_record(manager, record, &target_scope, true, cancel).await {
                    Ok(new_id) => {
                        id_map.insert(record.id.clone(), new_id);
                        report.created += 1;
                    }
                    Err(_) => report.failed += 1,
                }
            }
            MergeStrategy::Overwrite => {
                let existed = existing_by_id.is_some();
                if existed {
                    let _ = manager.delete(&record.id, cancel).await;
                }
                match store_record(manager, record, &target_scope, true, cancel).await {
                    Ok(new_id) => {
                        id_map.insert(record.id.clone(), new_id);
                        if existed {
                            report.overwritten += 1;
                        } else {
                            report.created += 1;
                        }
                    }
                    Err(_) => report.failed += 1,
                }
            }
            MergeStrategy::CreateVersions => match store_record(manager, record, &target_scope, false, cancel).await {
                Ok(new_id) => {
                    id_map.insert(record.id.clone(), new_id);
                    report.created += 1;
                }
                Err(_) => report.failed += 1,
            },
        }
    }

    for assoc in &payload.associations {
        match (id_map.get(&assoc.source_id), id_map.get(&assoc.target_id)) {
            (Some(a), Some(b)) if a != b => {
                let mut graph = manager.graph().write().await;
                match graph.add_edge(a, b, assoc.weight, assoc.kind) {
                    Ok(()) => report.associations_created += 1,
                    Err(_) => report.associations_dropped += 1,
                }
            }
            _ => report.associations_dropped += 1,
        }
    }

    Ok(report)
}

/// Find an existing record in `scope` whose content hash matches `content_hash`, i.e. a
/// different id carrying identical content. Used by `skip_duplicates` to catch
/// duplicates that didn't re-use the exported id.
fn find_content_duplicate(manager: &MemoryManager, content_hash: &str, scope: &str) -> Result<Option<String>> {
    let candidates = manager
        .metadata_store()
        .find_by_content_hash(content_hash)
        .map_err(|e| MnemoError::state_inconsistency(format!("content hash lookup failed during import: {e}")))?;
    for id in candidates {
        let memory = manager
            .metadata_store()
            .get(&id)
            .map_err(|e| MnemoError::state_inconsistency(format!("metadata lookup failed during import: {e}")))?;
        if let Some(memory) = memory {
            if memory.scope == scope {
                return Ok(Some(id));
            }
        }
    }
    Ok(None)
}

/// Store an imported record. `preserve_id` keeps the exported id (`skip_duplicates`'s
/// create path and `overwrite`); `create_versions` mints a fresh one instead.
async fn store_record(
    manager: &MemoryManager,
    record: &ExportRecord,
    target_scope: &str,
    preserve_id: bool,
    cancel: &CancellationToken,
) -> Result<String> {
    let options = StoreOptions {
        allow_duplicates: true,
        duplicate_threshold: None,
        auto_associate: false,
        ..StoreOptions::default()
    };
    let outcome = if preserve_id {
        manager
            .store_with_id(
                &record.id,
                &record.content,
                target_scope,
                record.tags.clone(),
                record.category.clone(),
                record.metadata.clone(),
                &options,
                cancel,
            )
            .await?
    } else {
        manager
            .store(
                &record.content,
                target_scope,
                record.tags.clone(),
                record.category.clone(),
                record.metadata.clone(),
                &options,
                cancel,
            )
            .await?
    };
    Ok(outcome.memory.id)
}
