//! # mnemo-core
//!
//! An associative memory engine: a vector-indexed semantic memory store with
//! hierarchical scopes, duplicate detection, and an association graph linking related
//! memories together.
//!
//! The crate is organised around nine components, each owning one concern:
//!
//! - [`embeddings`] (C1) — text to fixed-dimension unit vectors, with an exact-text
//!   cache.
//! - [`vector`] (C2) — an HNSW approximate nearest-neighbour index over those vectors,
//!   filterable by scope.
//! - [`store`] (C3) — the durable metadata record for each memory: content, scope,
//!   tags, category, arbitrary caller metadata.
//! - [`graph`] (C4) — an in-process weighted graph of memory-to-memory associations.
//! - [`scope`] (C5) — the `/`-delimited namespace hierarchy memories live in.
//! - [`dedup`] (C6) — hash- and similarity-based duplicate detection at ingest time.
//! - [`manager`] (C7) — the sole writer across C2/C3/C4, with per-id locking and
//!   compensating multi-store writes.
//! - [`search`] (C8) — query planning: standard and diversified search, association
//!   discovery.
//! - [`sync`] (C9) — export/import with configurable merge strategies.
//!
//! [`Engine`] ties these together behind a single handle.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mnemo_core::{Config, Engine};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> mnemo_core::error::Result<()> {
//! let engine = Engine::open(Config::default()).await?;
//! let cancel = CancellationToken::new();
//! let outcome = engine
//!     .store("the mitochondria is the powerhouse of the cell", "facts/biology", vec![], None, Default::default(), &Default::default(), &cancel)
//!     .await?;
//! println!("stored {}", outcome.memory.id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `embeddings` (default): local ONNX embedding inference via `fastembed`.
//! - `vector-search` (default): HNSW vector search via `usearch`. [`Engine`],
//!   [`manager`], [`search`] and [`dedup`] all require this feature.
//! - `bundled-sqlite` (default): statically link SQLite rather than relying on the
//!   system library.

pub mod config;
pub mod content;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod model;
pub mod scope;
pub mod store;
pub mod value;
pub mod vector;

#[cfg(feature = "vector-search")]
pub mod dedup;
#[cfg(feature = "vector-search")]
pub mod manager;
#[cfg(feature = "vector-search")]
pub mod search;
#[cfg(feature = "vector-search")]
pub mod sync;

pub use config::Config;
pub use error::{MnemoError, Result, StoreKind};
pub use model::{Association, AssociationKind, Memory};
pub use scope::{Scope, ScopeFilter};
pub use value::{Metadata, Value};

#[cfg(feature = "vector-search")]
use std::sync::Arc;

#[cfg(feature = "vector-search")]
use tokio_util::sync::CancellationToken;

#[cfg(feature = "vector-search")]
use manager::{GetResult, MemoryManager, MoveResult, StoreOptions, StoreOutcome, UpdatePatch};
#[cfg(feature = "vector-search")]
use search::{SearchHit, SearchMode, SearchOptions, SearchPlanner};
#[cfg(feature = "vector-search")]
use store::{Page, PageResult};
#[cfg(feature = "vector-search")]
use sync::{ExportPayload, ImportReport, MergeStrategy};

/// The engine handle: cheap to clone (an `Arc` around the shared manager), `Send +
/// Sync`, safe to share across tasks. Requires the `vector-search` feature, since the
/// manager it wraps owns the vector index.
#[cfg(feature = "vector-search")]
#[derive(Clone)]
pub struct Engine {
    manager: Arc<MemoryManager>,
    config: Config,
}

#[cfg(feature = "vector-search")]
impl Engine {
    /// Open (or create) an engine rooted at `config.data_dir`, wiring the embedding
    /// client, vector index, metadata store and association graph together.
    pub async fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| MnemoError::state_inconsistency(format!("failed to create data dir: {e}")))?;

        let embeddings = embeddings::EmbeddingClient::new(config.embedding_dimension, config.embedding_cache_size);

        let vector_index = vector::VectorIndex::open(
            &config.vector_index_dir(),
            vector::VectorIndexConfig::new(config.embedding_dimension),
        )
        .map_err(|e| MnemoError::state_inconsistency(format!("failed to open vector index: {e}")))?;

        let metadata_store = store::MetadataStore::open(&config.metadata_db_path())
            .map_err(|e| MnemoError::state_inconsistency(format!("failed to open metadata store: {e}")))?;

        let graph = graph::AssociationGraph::open(&config.graph_dir())
            .map_err(|e| MnemoError::state_inconsistency(format!("failed to open association graph: {e}")))?;

        let manager = MemoryManager::new(embeddings, vector_index, metadata_store, graph, config.per_id_shards)
            .with_persist_dir(config.vector_index_dir());

        Ok(Engine {
            manager: Arc::new(manager),
            config,
        })
    }

    /// An in-memory engine with no on-disk persistence, for tests and short-lived
    /// processes.
    pub fn in_memory(config: Config) -> Result<Self> {
        let embeddings = embeddings::EmbeddingClient::new(config.embedding_dimension, config.embedding_cache_size);
        let vector_index = vector::VectorIndex::with_config(vector::VectorIndexConfig::new(config.embedding_dimension))
            .map_err(|e| MnemoError::state_inconsistency(format!("failed to create vector index: {e}")))?;
        let metadata_store = store::MetadataStore::open_in_memory()
            .map_err(|e| MnemoError::state_inconsistency(format!("failed to open metadata store: {e}")))?;
        let graph = graph::AssociationGraph::new_in_memory();

        let manager = MemoryManager::new(embeddings, vector_index, metadata_store, graph, config.per_id_shards);
        Ok(Engine {
            manager: Arc::new(manager),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn store(
        &self,
        content: &str,
        scope: &str,
        tags: Vec<String>,
        category: Option<String>,
        metadata: Metadata,
        options: &StoreOptions,
        cancel: &CancellationToken,
    ) -> Result<StoreOutcome> {
        self.manager.store(content, scope, tags, category, metadata, options, cancel).await
    }

    pub async fn get(&self, id: &str, include_associations: bool, association_limit: usize, cancel: &CancellationToken) -> Result<GetResult> {
        self.manager.get(id, include_associations, association_limit, cancel).await
    }

    pub async fn update(&self, id: &str, patch: &UpdatePatch, preserve_associations: bool, cancel: &CancellationToken) -> Result<Memory> {
        self.manager.update(id, patch, preserve_associations, cancel).await
    }

    pub async fn delete(&self, id: &str, cancel: &CancellationToken) -> Result<bool> {
        self.manager.delete(id, cancel).await
    }

    pub async fn move_memories(&self, ids: &[String], target_scope: &str, cancel: &CancellationToken) -> Result<Vec<MoveResult>> {
        self.manager.move_memories(ids, target_scope, cancel).await
    }

    pub fn list(&self, scope_filter: &ScopeFilter, page: &Page, cancel: &CancellationToken) -> Result<PageResult> {
        self.manager.list(scope_filter, page, cancel)
    }

    pub async fn cleanup(&self, scope_filter: &ScopeFilter, older_than: Option<chrono::DateTime<chrono::Utc>>, cancel: &CancellationToken) -> Result<usize> {
        self.manager.cleanup(scope_filter, older_than, cancel).await
    }

    pub async fn search(&self, query: &str, options: &SearchOptions, cancel: &CancellationToken) -> Result<Vec<SearchHit>> {
        error::check_cancelled(cancel)?;
        let vector_index = self.manager.vector_index().read().await;
        let graph = self.manager.graph().read().await;
        let planner = SearchPlanner {
            embeddings: self.manager.embeddings(),
            vector_index: &vector_index,
            metadata_store: self.manager.metadata_store(),
            graph: &graph,
        };
        planner.search(query, options)
    }

    pub async fn discover_associations(&self, memory_id: &str, limit: usize, similarity_threshold: f32, cancel: &CancellationToken) -> Result<Vec<(String, f32)>> {
        error::check_cancelled(cancel)?;
        let vector_index = self.manager.vector_index().read().await;
        let graph = self.manager.graph().read().await;
        let planner = SearchPlanner {
            embeddings: self.manager.embeddings(),
            vector_index: &vector_index,
            metadata_store: self.manager.metadata_store(),
            graph: &graph,
        };
        planner.discover_associations(memory_id, limit, similarity_threshold)
    }

    pub async fn export(&self, scope_filter: &ScopeFilter, include_associations: bool, cancel: &CancellationToken) -> Result<ExportPayload> {
        sync::export(&self.manager, scope_filter, include_associations, cancel).await
    }

    pub async fn import(&self, payload: &ExportPayload, merge_strategy: MergeStrategy, scope_prefix: Option<&str>, cancel: &CancellationToken) -> Result<ImportReport> {
        sync::import(&self.manager, payload, merge_strategy, scope_prefix, cancel).await
    }
}

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        Association, AssociationKind, Config, Memory, MnemoError, Result, Scope, ScopeFilter,
    };

    #[cfg(feature = "vector-search")]
    pub use crate::Engine;
    #[cfg(feature = "vector-search")]
    pub use crate::manager::{GetResult, StoreOptions, StoreOutcome, UpdatePatch};
    #[cfg(feature = "vector-search")]
    pub use crate::search::{SearchHit, SearchMode, SearchOptions};
    #[cfg(feature = "vector-search")]
    pub use crate::sync::MergeStrategy;
}
