//! Explicit engine configuration.
//!
//! Replaces the "singleton memory manager" pattern with a plain struct passed into
//! [`crate::Engine::open`]. Nothing in this crate reads environment variables or global
//! state implicitly outside of [`Config::from_env`], which a caller opts into.

use std::path::PathBuf;

use directories::ProjectDirs;

/// Every configuration key enumerated by the core's external interface.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub embedding_dimension: usize,
    pub embedding_cache_size: usize,
    pub duplicate_default_threshold: Option<f32>,
    pub search_default_similarity_threshold: f32,
    pub association_default_min_weight: f32,
    pub association_default_limit: usize,
    pub max_export_size_bytes: u64,
    pub max_import_size_bytes: u64,
    pub per_id_shards: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("", "", "mnemo")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".mnemo"));

        Config {
            data_dir,
            embedding_dimension: 256,
            embedding_cache_size: 1024,
            duplicate_default_threshold: None,
            search_default_similarity_threshold: 0.1,
            association_default_min_weight: 0.7,
            association_default_limit: 5,
            max_export_size_bytes: 100 * 1024 * 1024,
            max_import_size_bytes: 100 * 1024 * 1024,
            per_id_shards: 64,
        }
    }
}

impl Config {
    /// Build a config from `MNEMO_*` environment variables, falling back to
    /// [`Config::default`] for anything unset.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(dir) = std::env::var("MNEMO_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = env_usize("MNEMO_EMBEDDING_DIMENSION") {
            config.embedding_dimension = v;
        }
        if let Some(v) = env_usize("MNEMO_EMBEDDING_CACHE_SIZE") {
            config.embedding_cache_size = v;
        }
        if let Ok(raw) = std::env::var("MNEMO_DUPLICATE_DEFAULT_THRESHOLD") {
            config.duplicate_default_threshold = raw.parse::<f32>().ok();
        }
        if let Some(v) = env_f32("MNEMO_SEARCH_DEFAULT_SIMILARITY_THRESHOLD") {
            config.search_default_similarity_threshold = v;
        }
        if let Some(v) = env_f32("MNEMO_ASSOCIATION_DEFAULT_MIN_WEIGHT") {
            config.association_default_min_weight = v;
        }
        if let Some(v) = env_usize("MNEMO_ASSOCIATION_DEFAULT_LIMIT") {
            config.association_default_limit = v;
        }
        if let Some(v) = env_u64("MNEMO_MAX_EXPORT_SIZE_BYTES") {
            config.max_export_size_bytes = v;
        }
        if let Some(v) = env_u64("MNEMO_MAX_IMPORT_SIZE_BYTES") {
            config.max_import_size_bytes = v;
        }
        if let Some(v) = env_usize("MNEMO_PER_ID_SHARDS") {
            config.per_id_shards = v;
        }

        config
    }

    pub fn metadata_db_path(&self) -> PathBuf {
        self.data_dir.join("metadata.sqlite3")
    }

    pub fn vector_index_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    pub fn graph_dir(&self) -> PathBuf {
        self.data_dir.join("graph")
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_f32(key: &str) -> Option<f32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
