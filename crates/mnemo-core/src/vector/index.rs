//! Vector index (C2).
//!
//! HNSW approximate nearest-neighbour index backed by `usearch`, generalised from the
//! teacher's vector index with scope-awareness: every stored vector carries a canonical
//! scope string, and `query` can restrict results to `{any}`, `{exact}` or `{prefix}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[cfg(feature = "vector-search")]
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::scope::ScopeFilter;

pub const DEFAULT_CONNECTIVITY: usize = 16;
pub const DEFAULT_EXPANSION_ADD: usize = 128;
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VectorIndexError {
    #[error("index creation failed: {0}")]
    Creation(String),
    #[error("failed to add vector: {0}")]
    Add(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("invalid dimensions: expected {expected}, got {got}")]
    InvalidDimensions { expected: usize, got: usize },
}

#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl VectorIndexConfig {
    pub fn new(dimensions: usize) -> Self {
        VectorIndexConfig {
            dimensions,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndexStats {
    pub total_vectors: usize,
    pub dimensions: usize,
}

/// Approximate nearest-neighbour index over stored memory embeddings (C2).
#[cfg(feature = "vector-search")]
pub struct VectorIndex {
    index: Index,
    config: VectorIndexConfig,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    key_to_scope: HashMap<String, String>,
    next_id: u64,
}

#[cfg(feature = "vector-search")]
impl VectorIndex {
    pub fn with_config(config: VectorIndexConfig) -> Result<Self, VectorIndexError> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };
        let index = Index::new(&options).map_err(|e| VectorIndexError::Creation(e.to_string()))?;
        index.reserve(16).map_err(|e| VectorIndexError::Creation(e.to_string()))?;
        Ok(VectorIndex {
            index,
            config,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            key_to_scope: HashMap::new(),
            next_id: 0,
        })
    }

    pub fn open(dir: &Path, config: VectorIndexConfig) -> Result<Self, VectorIndexError> {
        let index_path = dir.join("index.usearch");
        if index_path.exists() {
            Self::load(&index_path, config)
        } else {
            std::fs::create_dir_all(dir)
                .map_err(|e| VectorIndexError::Persistence(e.to_string()))?;
            Self::with_config(config)
        }
    }

    pub fn persist(&self, dir: &Path) -> Result<(), VectorIndexError> {
        std::fs::create_dir_all(dir).map_err(|e| VectorIndexError::Persistence(e.to_string()))?;
        self.save(&dir.join("index.usearch"))
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn ensure_capacity(&self) -> Result<(), VectorIndexError> {
        let capacity = self.index.capacity();
        let size = self.index.size();
        if size >= capacity {
            let new_capacity = std::cmp::max(capacity * 2, 16);
            self.index
                .reserve(new_capacity)
                .map_err(|e| VectorIndexError::Creation(e.to_string()))?;
        }
        Ok(())
    }

    /// Insert or replace the vector stored under `key`, recording its scope for
    /// prefix/exact filtering.
    pub fn upsert(&mut self, key: &str, vector: &[f32], scope: &str) -> Result<(), VectorIndexError> {
        if vector.len() != self.config.dimensions {
            return Err(VectorIndexError::InvalidDimensions {
                expected: self.config.dimensions,
                got: vector.len(),
            });
        }

        if let Some(&existing_id) = self.key_to_id.get(key) {
            self.index
                .remove(existing_id)
                .map_err(|e| VectorIndexError::Add(e.to_string()))?;
            self.ensure_capacity()?;
            self.index
                .add(existing_id, vector)
                .map_err(|e| VectorIndexError::Add(e.to_string()))?;
            self.key_to_scope.insert(key.to_string(), scope.to_string());
            return Ok(());
        }

        self.ensure_capacity()?;
        let id = self.next_id;
        self.next_id += 1;
        self.index
            .add(id, vector)
            .map_err(|e| VectorIndexError::Add(e.to_string()))?;
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        self.key_to_scope.insert(key.to_string(), scope.to_string());
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<bool, VectorIndexError> {
        if let Some(id) = self.key_to_id.remove(key) {
            self.id_to_key.remove(&id);
            self.key_to_scope.remove(key);
            self.index
                .remove(id)
                .map_err(|e| VectorIndexError::Add(e.to_string()))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.key_to_id.contains_key(key)
    }

    /// `query(vector, k, scope_filter) -> [(id, cosine_score)]`, ordered by descending
    /// cosine similarity. `usearch`'s search has no native predicate filter, so a
    /// non-`Any` filter oversamples candidates and filters by the recorded scope,
    /// widening the fetch until satisfied or the whole index has been considered.
    pub fn query(
        &self,
        vector: &[f32],
        k: usize,
        scope_filter: &ScopeFilter,
    ) -> Result<Vec<(String, f32)>, VectorIndexError> {
        if vector.len() != self.config.dimensions {
            return Err(VectorIndexError::InvalidDimensions {
                expected: self.config.dimensions,
                got: vector.len(),
            });
        }
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if matches!(scope_filter, ScopeFilter::Any) {
            return self.raw_search(vector, k);
        }

        let mut fetch = (k * 8).max(k + 32);
        loop {
            let fetch_capped = fetch.min(self.len());
            let candidates = self.raw_search(vector, fetch_capped)?;
            let filtered: Vec<(String, f32)> = candidates
                .iter()
                .filter(|(key, _)| {
                    self.key_to_scope
                        .get(key)
                        .map(|s| scope_filter.matches(s))
                        .unwrap_or(false)
                })
                .take(k)
                .cloned()
                .collect();

            if filtered.len() >= k || fetch_capped >= self.len() {
                return Ok(filtered);
            }
            fetch *= 4;
        }
    }

    fn raw_search(&self, vector: &[f32], k: usize) -> Result<Vec<(String, f32)>, VectorIndexError> {
        let results = self
            .index
            .search(vector, k)
            .map_err(|e| VectorIndexError::Search(e.to_string()))?;

        let mut out = Vec::with_capacity(results.keys.len());
        for (key, distance) in results.keys.iter().zip(results.distances.iter()) {
            if let Some(string_key) = self.id_to_key.get(key) {
                // Cosine similarity from a unit-vector distance: 1 - distance.
                let score = 1.0 - distance;
                out.push((string_key.clone(), score));
            }
        }
        Ok(out)
    }

    /// Count of indexed vectors matching `scope_filter`.
    pub fn count(&self, scope_filter: &ScopeFilter) -> usize {
        match scope_filter {
            ScopeFilter::Any => self.len(),
            other => self
                .key_to_scope
                .values()
                .filter(|s| other.matches(s))
                .count(),
        }
    }

    fn save(&self, path: &Path) -> Result<(), VectorIndexError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| VectorIndexError::Persistence("invalid path".to_string()))?;
        self.index
            .save(path_str)
            .map_err(|e| VectorIndexError::Persistence(e.to_string()))?;

        let mappings = serde_json::json!({
            "key_to_id": self.key_to_id,
            "key_to_scope": self.key_to_scope,
            "next_id": self.next_id,
        });
        let mappings_path = mappings_path(path);
        std::fs::write(&mappings_path, serde_json::to_vec(&mappings).unwrap())
            .map_err(|e| VectorIndexError::Persistence(e.to_string()))?;
        Ok(())
    }

    fn load(path: &Path, config: VectorIndexConfig) -> Result<Self, VectorIndexError> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };
        let index = Index::new(&options).map_err(|e| VectorIndexError::Creation(e.to_string()))?;
        let path_str = path
            .to_str()
            .ok_or_else(|| VectorIndexError::Persistence("invalid path".to_string()))?;
        index
            .load(path_str)
            .map_err(|e| VectorIndexError::Persistence(e.to_string()))?;

        let mappings_path = mappings_path(path);
        let raw = std::fs::read(&mappings_path)
            .map_err(|e| VectorIndexError::Persistence(e.to_string()))?;
        let mappings: serde_json::Value =
            serde_json::from_slice(&raw).map_err(|e| VectorIndexError::Persistence(e.to_string()))?;

        let key_to_id: HashMap<String, u64> =
            serde_json::from_value(mappings["key_to_id"].clone())
                .map_err(|e| VectorIndexError::Persistence(e.to_string()))?;
        let key_to_scope: HashMap<String, String> =
            serde_json::from_value(mappings["key_to_scope"].clone())
                .map_err(|e| VectorIndexError::Persistence(e.to_string()))?;
        let next_id = mappings["next_id"]
            .as_u64()
            .ok_or_else(|| VectorIndexError::Persistence("missing next_id".to_string()))?;
        let id_to_key = key_to_id.iter().map(|(k, &v)| (v, k.clone())).collect();

        Ok(VectorIndex {
            index,
            config,
            key_to_id,
            id_to_key,
            key_to_scope,
            next_id,
        })
    }

    pub fn stats(&self) -> VectorIndexStats {
        VectorIndexStats {
            total_vectors: self.len(),
            dimensions: self.config.dimensions,
        }
    }
}

#[cfg(feature = "vector-search")]
fn mappings_path(index_path: &Path) -> PathBuf {
    index_path.with_extension("mappings.json")
}

#[cfg(test)]
#[cfg(feature = "vector-search")]
mod tests {
    use super::*;

    fn test_vector(seed: f32, dim: usize) -> Vec<f32> {
        let raw: Vec<f32> = (0..dim).map(|i| ((i as f32 + seed) / dim as f32).sin()).collect();
        let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        raw.iter().map(|x| x / norm.max(1e-9)).collect()
    }

    fn new_index(dim: usize) -> VectorIndex {
        VectorIndex::with_config(VectorIndexConfig::new(dim)).unwrap()
    }

    #[test]
    fn upsert_and_query_scope_any() {
        let mut index = new_index(32);
        let v1 = test_vector(1.0, 32);
        let v2 = test_vector(50.0, 32);
        index.upsert("a", &v1, "work/notes").unwrap();
        index.upsert("b", &v2, "work/notes").unwrap();

        let results = index.query(&v1, 2, &ScopeFilter::Any).unwrap();
        assert_eq!(results[0].0, "a");
    }

    #[test]
    fn query_respects_exact_scope_filter() {
        let mut index = new_index(16);
        let v1 = test_vector(1.0, 16);
        index.upsert("a", &v1, "session/tmp").unwrap();
        index.upsert("b", &v1, "work/keep").unwrap();

        let only_work = index
            .query(&v1, 5, &ScopeFilter::Exact(crate::scope::parse("work/keep").unwrap()))
            .unwrap();
        assert_eq!(only_work.len(), 1);
        assert_eq!(only_work[0].0, "b");
    }

    #[test]
    fn query_respects_prefix_scope_filter() {
        let mut index = new_index(16);
        let v1 = test_vector(1.0, 16);
        index.upsert("a", &v1, "session/tmp").unwrap();
        index.upsert("b", &v1, "work/keep").unwrap();
        index.upsert("c", &v1, "work/keep/inner").unwrap();

        let work = index
            .query(&v1, 5, &ScopeFilter::Prefix(crate::scope::parse("work").unwrap()))
            .unwrap();
        let keys: Vec<&str> = work.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"b"));
        assert!(keys.contains(&"c"));
        assert!(!keys.contains(&"a"));
    }

    #[test]
    fn remove_drops_key_and_scope() {
        let mut index = new_index(8);
        let v1 = test_vector(1.0, 8);
        index.upsert("a", &v1, "work").unwrap();
        assert!(index.remove("a").unwrap());
        assert!(!index.contains("a"));
        assert_eq!(index.count(&ScopeFilter::Any), 0);
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let mut index = new_index(8);
        let wrong = vec![1.0, 2.0, 3.0];
        assert!(index.upsert("a", &wrong, "work").is_err());
    }
}
