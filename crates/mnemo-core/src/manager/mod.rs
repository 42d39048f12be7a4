//! Memory manager (C7): the sole writer of the vector index, metadata store and
//! association graph, with per-id locking and compensating multi-store writes.

mod sharded_mutex;

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::content;
use crate::dedup;
use crate::embeddings::EmbeddingClient;
use crate::error::{check_cancelled, MnemoError, Result, StoreKind};
use crate::graph::AssociationGraph;
use crate::model::{Association, AssociationKind, Memory};
use crate::scope::{self, ScopeFilter};
use crate::store::{MetadataStore, Page, PageResult, Patch};
use crate::value::{self, Metadata};
use crate::vector::VectorIndex;

use sharded_mutex::ShardedMutex;

/// Options accepted by [`MemoryManager::store`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub allow_duplicates: bool,
    pub duplicate_threshold: Option<f32>,
    pub auto_associate: bool,
    pub association_limit: usize,
    pub association_min_weight: f32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            allow_duplicates: false,
            duplicate_threshold: None,
            auto_associate: true,
            association_limit: 5,
            association_min_weight: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreOutcome {
    pub memory: Memory,
    pub associations_created: Vec<Association>,
}

/// A patch accepted by [`MemoryManager::update`]. Scope changes are out of scope here;
/// use [`MemoryManager::move_memories`] instead.
#[derive(Debug, Clone, Default)]
pub struct UpdatePatch {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<Option<String>>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone)]
pub struct GetResult {
    pub memory: Memory,
    pub associations: Vec<(String, f32)>,
}

#[derive(Debug, Clone)]
pub struct MoveResult {
    pub id: String,
    pub moved: bool,
    pub error: Option<String>,
}

pub struct MemoryManager {
    embeddings: EmbeddingClient,
    vector_index: RwLock<VectorIndex>,
    metadata_store: MetadataStore,
    graph: RwLock<AssociationGraph>,
    id_locks: ShardedMutex,
    seq: AtomicI64,
    persist_dir: Option<PathBuf>,
}

impl MemoryManager {
    pub fn new(
        embeddings: EmbeddingClient,
        vector_index: VectorIndex,
        metadata_store: MetadataStore,
        graph: AssociationGraph,
        per_id_shards: usize,
    ) -> Self {
        MemoryManager {
            embeddings,
            vector_index: RwLock::new(vector_index),
            metadata_store,
            graph: RwLock::new(graph),
            id_locks: ShardedMutex::new(per_id_shards),
            seq: AtomicI64::new(0),
            persist_dir: None,
        }
    }

    /// Persist the vector index to `dir` after every write that touches it. Unset for
    /// in-memory engines, where there is nothing on disk to keep in sync.
    pub fn with_persist_dir(mut self, dir: PathBuf) -> Self {
        self.persist_dir = Some(dir);
        self
    }

    /// Flush the vector index to disk if a persistence directory was configured. Called
    /// after every vector-index write so C2 survives a restart alongside C3 and C4.
    async fn persist_vector_index(&self) -> Result<()> {
        if let Some(dir) = &self.persist_dir {
            self.vector_index
                .read()
                .await
                .persist(dir)
                .map_err(|e| MnemoError::state_inconsistency(format!("vector index persistence failed: {e}")))?;
        }
        Ok(())
    }

    pub fn embeddings(&self) -> &EmbeddingClient {
        &self.embeddings
    }

    pub fn metadata_store(&self) -> &MetadataStore {
        &self.metadata_store
    }

    pub fn vector_index(&self) -> &RwLock<VectorIndex> {
        &self.vector_index
    }

    pub fn graph(&self) -> &RwLock<AssociationGraph> {
        &self.graph
    }

    pub async fn store(&self, content: &str, scope: &str, tags: Vec<String>, category: Option<String>, metadata: Metadata, options: &StoreOptions, cancel: &CancellationToken) -> Result<StoreOutcome> {
        self.store_impl(None, content, scope, tags, category, metadata, options, cancel).await
    }

    /// Store under a caller-chosen id instead of minting a fresh one. Used by import to
    /// preserve the exported id across `skip_duplicates`'s create path and `overwrite`.
    /// Fails with [`MnemoError::ValidationFailed`] if `id` is already in use.
    #[allow(clippy::too_many_arguments)]
    pub async fn store_with_id(
        &self,
        id: &str,
        content: &str,
        scope: &str,
        tags: Vec<String>,
        category: Option<String>,
        metadata: Metadata,
        options: &StoreOptions,
        cancel: &CancellationToken,
    ) -> Result<StoreOutcome> {
        self.store_impl(Some(id.to_string()), content, scope, tags, category, metadata, options, cancel).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn store_impl(
        &self,
        id: Option<String>,
        content: &str,
        scope: &str,
        tags: Vec<String>,
        category: Option<String>,
        metadata: Metadata,
        options: &StoreOptions,
        cancel: &CancellationToken,
    ) -> Result<StoreOutcome> {
        check_cancelled(cancel)?;
        let normalised = content::normalize(content);
        if normalised.is_empty() {
            return Err(MnemoError::validation("content must be non-empty after normalisation"));
        }
        value::check_metadata_bounds(&metadata)?;
        let canonical_scope = scope::canonical(scope)?;
        let hash = content::fingerprint(&normalised);

        // Held for the rest of this call when an explicit id is supplied, so a concurrent
        // `store_with_id`/`update`/`delete` targeting the same id can't interleave with
        // the existence check and the write below.
        let _id_guard;
        let id = match id {
            Some(id) => {
                _id_guard = Some(self.id_locks.lock(&id).await);
                if self
                    .metadata_store
                    .get(&id)
                    .map_err(|e| MnemoError::state_inconsistency(format!("metadata lookup failed: {e}")))?
                    .is_some()
                {
                    return Err(MnemoError::validation(format!("id {id} is already in use")));
                }
                id
            }
            None => {
                _id_guard = None;
                uuid::Uuid::new_v4().to_string()
            }
        };

        let embedding = self.embeddings.embed(&normalised)?;

        if !options.allow_duplicates {
            let existing = {
                let index = self.vector_index.read().await;
                dedup::find_duplicate(&self.metadata_store, &index, &hash, &embedding, options.duplicate_threshold)?
            };
            if let Some(candidate) = existing {
                return Err(MnemoError::DuplicateRejected {
                    message: format!("content matches existing memory {}", candidate.memory_id),
                    candidate_id: candidate.memory_id,
                    score: candidate.score,
                });
            }
        }

        let now = Utc::now();
        let record = Memory {
            id: id.clone(),
            content: normalised,
            scope: canonical_scope,
            tags,
            category,
            metadata,
            created_at: now,
            updated_at: now,
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            content_hash: hash,
            has_embedding: true,
        };

        check_cancelled(cancel)?;
        self.write_new_record(&record, &embedding).await?;
        self.persist_vector_index().await?;

        let associations_created = if options.auto_associate {
            self.auto_associate(&record, &embedding, options.association_limit, options.association_min_weight)
                .await
        } else {
            Vec::new()
        };

        Ok(StoreOutcome {
            memory: record,
            associations_created,
        })
    }

    /// Fan out C2.upsert / C3.put / C4.add_node concurrently; on any failure, undo
    /// whichever legs already committed and fail with `StoreFailed`.
    async fn write_new_record(&self, record: &Memory, embedding: &[f32]) -> Result<()> {
        let vector_fut = async {
            self.vector_index
                .write()
                .await
                .upsert(&record.id, embedding, &record.scope)
                .map_err(|e| e.to_string())
        };
        let metadata_fut = async { self.metadata_store.put(record).map_err(|e| e.to_string()) };
        let graph_fut = async {
            self.graph
                .write()
                .await
                .add_node(&record.id)
                .map_err(|e| e.to_string())
        };

        let (vector_result, metadata_result, graph_result) = tokio::join!(vector_fut, metadata_fut, graph_fut);

        let mut committed = Vec::new();
        let mut failed: Option<(StoreKind, String)> = None;

        match vector_result {
            Ok(()) => committed.push(StoreKind::VectorIndex),
            Err(e) => {
                failed.get_or_insert((StoreKind::VectorIndex, e));
            }
        }
        match metadata_result {
            Ok(()) => committed.push(StoreKind::MetadataStore),
            Err(e) => {
                failed.get_or_insert((StoreKind::MetadataStore, e));
            }
        }
        match graph_result {
            Ok(()) => committed.push(StoreKind::AssociationGraph),
            Err(e) => {
                failed.get_or_insert((StoreKind::AssociationGraph, e));
            }
        }

        let Some((which, cause)) = failed else {
            return Ok(());
        };

        let mut rolled_back = Vec::new();
        for kind in &committed {
            match kind {
                StoreKind::VectorIndex => {
                    if self.vector_index.write().await.remove(&record.id).is_ok() {
                        rolled_back.push(StoreKind::VectorIndex);
                    }
                }
                StoreKind::MetadataStore => {
                    if self.metadata_store.delete(&record.id).is_ok() {
                        rolled_back.push(StoreKind::MetadataStore);
                    }
                }
                StoreKind::AssociationGraph => {
                    if self.graph.write().await.remove_node(&record.id).is_ok() {
                        rolled_back.push(StoreKind::AssociationGraph);
                    }
                }
            }
        }

        Err(MnemoError::StoreFailed {
            message: format!("{which} write failed: {cause}"),
            which,
            committed,
            rolled_back,
        })
    }

    async fn auto_associate(&self, record: &Memory, embedding: &[f32], limit: usize, min_weight: f32) -> Vec<Association> {
        let neighbours = {
            let index = self.vector_index.read().await;
            match index.query(embedding, limit + 1, &ScopeFilter::Any) {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!(error = %e, id = %record.id, "auto-associate query failed");
                    return Vec::new();
                }
            }
        };

        let mut created = Vec::new();
        let mut graph = self.graph.write().await;
        for (candidate_id, score) in neighbours {
            if candidate_id == record.id || score < min_weight {
                continue;
            }
            match graph.add_edge(&record.id, &candidate_id, score, AssociationKind::Auto) {
                Ok(()) => {
                    let (source, target) = Association::canonical_pair(&record.id, &candidate_id);
                    created.push(Association {
                        source_id: source,
                        target_id: target,
                        weight: score,
                        kind: AssociationKind::Auto,
                        created_at: Utc::now(),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, a = %record.id, b = %candidate_id, "failed to record association");
                }
            }
        }
        created
    }

    pub async fn get(&self, id: &str, include_associations: bool, association_limit: usize, cancel: &CancellationToken) -> Result<GetResult> {
        check_cancelled(cancel)?;
        let memory = self
            .metadata_store
            .get(id)
            .map_err(|e| MnemoError::state_inconsistency(format!("metadata lookup failed: {e}")))?
            .ok_or_else(|| MnemoError::not_found(format!("no memory with id {id}")))?;

        let associations = if include_associations {
            self.graph.read().await.neighbours(id, association_limit, 0.0)
        } else {
            Vec::new()
        };

        Ok(GetResult { memory, associations })
    }

    pub async fn update(&self, id: &str, patch: &UpdatePatch, preserve_associations: bool, cancel: &CancellationToken) -> Result<Memory> {
        check_cancelled(cancel)?;
        let _guard = self.id_locks.lock(id).await;

        if self
            .metadata_store
            .get(id)
            .map_err(|e| MnemoError::state_inconsistency(format!("metadata lookup failed: {e}")))?
            .is_none()
        {
            return Err(MnemoError::not_found(format!("no memory with id {id}")));
        }

        if let Some(metadata) = &patch.metadata {
            value::check_metadata_bounds(metadata)?;
        }

        let mut store_patch = Patch {
            tags: patch.tags.clone(),
            category: patch.category.clone(),
            metadata: patch.metadata.clone(),
            ..Default::default()
        };

        let mut new_embedding = None;
        if let Some(new_content) = &patch.content {
            let normalised = content::normalize(new_content);
            if normalised.is_empty() {
                return Err(MnemoError::validation("content must be non-empty after normalisation"));
            }
            let embedding = self.embeddings.embed(&normalised)?;
            store_patch.content_hash = Some(content::fingerprint(&normalised));
            store_patch.content = Some(normalised);
            store_patch.has_embedding = Some(true);
            new_embedding = Some(embedding);
        }

        let updated = self
            .metadata_store
            .update(id, &store_patch)
            .map_err(|e| MnemoError::state_inconsistency(format!("metadata update failed: {e}")))?;

        check_cancelled(cancel)?;
        if let Some(embedding) = &new_embedding {
            self.vector_index
                .write()
                .await
                .upsert(id, embedding, &updated.scope)
                .map_err(|e| MnemoError::state_inconsistency(format!("vector re-index failed: {e}")))?;
            self.persist_vector_index().await?;
        }

        if !preserve_associations {
            let mut graph = self.graph.write().await;
            let incident = graph.neighbours(id, usize::MAX, 0.0);
            for (neighbour, _) in incident {
                let _ = graph.remove_edge(id, &neighbour, AssociationKind::Auto);
            }
        }

        Ok(updated)
    }

    /// Remove from C4 first (edges then node), then C3, then C2: a dangling edge is
    /// worse than a dangling vector.
    pub async fn delete(&self, id: &str, cancel: &CancellationToken) -> Result<bool> {
        check_cancelled(cancel)?;
        let _guard = self.id_locks.lock(id).await;

        let existed = self
            .metadata_store
            .get(id)
            .map_err(|e| MnemoError::state_inconsistency(format!("metadata lookup failed: {e}")))?
            .is_some();

        if !existed {
            return Ok(false);
        }

        self.graph
            .write()
            .await
            .remove_node(id)
            .map_err(|e| MnemoError::state_inconsistency(format!("graph removal failed: {e}")))?;

        self.metadata_store
            .delete(id)
            .map_err(|e| MnemoError::state_inconsistency(format!("metadata deletion failed: {e}")))?;

        self.vector_index
            .write()
            .await
            .remove(id)
            .map_err(|e| MnemoError::state_inconsistency(format!("vector removal failed: {e}")))?;
        self.persist_vector_index().await?;

        Ok(true)
    }

    /// Move each id to `target_scope` in C3 and C2; C4 is unaffected. Each id either
    /// fully moves or is left untouched; failures are reported per-id.
    pub async fn move_memories(&self, ids: &[String], target_scope: &str, cancel: &CancellationToken) -> Result<Vec<MoveResult>> {
        let canonical_scope = scope::canonical(target_scope)?;

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            check_cancelled(cancel)?;
            let _guard = self.id_locks.lock(id).await;
            results.push(self.move_one(id, &canonical_scope).await);
        }
        Ok(results)
    }

    async fn move_one(&self, id: &str, canonical_scope: &str) -> MoveResult {
        let patch = Patch {
            scope: Some(canonical_scope.to_string()),
            ..Default::default()
        };

        match self.metadata_store.update(id, &patch) {
            Ok(_) => {}
            Err(e) => {
                return MoveResult {
                    id: id.clone(),
                    moved: false,
                    error: Some(e.to_string()),
                }
            }
        }

        let vector_exists = self.vector_index.read().await.contains(id);
        if vector_exists {
            let embedding = match self.metadata_store.get(id) {
                Ok(Some(memory)) => self.embeddings.embed(&memory.content).ok(),
                _ => None,
            };
            if let Some(embedding) = embedding {
                if let Err(e) = self.vector_index.write().await.upsert(id, &embedding, canonical_scope) {
                    return MoveResult {
                        id: id.clone(),
                        moved: false,
                        error: Some(e.to_string()),
                    };
                }
                if let Err(e) = self.persist_vector_index().await {
                    return MoveResult {
                        id: id.clone(),
                        moved: false,
                        error: Some(e.to_string()),
                    };
                }
            }
        }

        MoveResult {
            id: id.clone(),
            moved: true,
            error: None,
        }
    }

    pub fn list(&self, scope_filter: &ScopeFilter, page: &Page, cancel: &CancellationToken) -> Result<PageResult> {
        check_cancelled(cancel)?;
        self.metadata_store
            .find_by_scope(scope_filter, page)
            .map_err(|e| MnemoError::state_inconsistency(format!("metadata scan failed: {e}")))
    }

    /// Iterate `list` and `delete` each match, returning the count removed.
    pub async fn cleanup(&self, scope_filter: &ScopeFilter, older_than: Option<DateTime<Utc>>, cancel: &CancellationToken) -> Result<usize> {
        let mut deleted = 0usize;
        let mut page = Page::first(200);
        loop {
            let result = self.list(scope_filter, &page, cancel)?;
            if result.items.is_empty() {
                break;
            }
            for memory in &result.items {
                check_cancelled(cancel)?;
                if let Some(cutoff) = older_than {
                    if memory.created_at >= cutoff {
                        continue;
                    }
                }
                if self.delete(&memory.id, cancel).await? {
                    deleted += 1;
                }
            }
            match result.next_cursor {
                Some(cursor) => page = Page { limit: page.limit, cursor: Some(cursor) },
                None => break,
            }
        }
        Ok(deleted)
    }
}
