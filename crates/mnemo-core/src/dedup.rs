//! Duplicate detector (C6).
//!
//! Given `(content, embedding)`, produce at most one candidate existing memory: an
//! exact-hash fast path against the metadata store, falling back to a top-1 cosine
//! check against the vector index.

use crate::content;
use crate::scope::ScopeFilter;
use crate::store::MetadataStore;
use crate::vector::VectorIndex;

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateCandidate {
    pub memory_id: String,
    pub score: f32,
}

/// Exact-hash fast path, then similarity check if no hash match and a threshold was
/// supplied.
pub fn find_duplicate(
    store: &MetadataStore,
    vector_index: &VectorIndex,
    content_hash: &str,
    embedding: &[f32],
    threshold: Option<f32>,
) -> crate::error::Result<Option<DuplicateCandidate>> {
    let hash_matches = store
        .find_by_content_hash(content_hash)
        .map_err(|e| crate::error::MnemoError::state_inconsistency(format!(
            "metadata store content-hash lookup failed: {e}"
        )))?;

    if let Some(id) = hash_matches.into_iter().next() {
        return Ok(Some(DuplicateCandidate {
            memory_id: id,
            score: 1.0,
        }));
    }

    let Some(threshold) = threshold else {
        return Ok(None);
    };

    let top = vector_index
        .query(embedding, 1, &ScopeFilter::Any)
        .map_err(|e| crate::error::MnemoError::state_inconsistency(format!(
            "vector index query failed during duplicate check: {e}"
        )))?;

    match top.into_iter().next() {
        Some((id, score)) if score >= threshold => Ok(Some(DuplicateCandidate { memory_id: id, score })),
        _ => Ok(None),
    }
}

/// Convenience wrapper computing the content hash via [`content::normalize`] +
/// [`content::fingerprint`].
pub fn hash_of(raw_content: &str) -> String {
    content::fingerprint(&content::normalize(raw_content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::VectorIndexConfig;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn sample_memory(id: &str, hash: &str) -> crate::model::Memory {
        crate::model::Memory {
            id: id.to_string(),
            content: "x".to_string(),
            scope: "work".to_string(),
            tags: vec![],
            category: None,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            seq: 0,
            content_hash: hash.to_string(),
            has_embedding: true,
        }
    }

    #[test]
    fn hash_fast_path_wins_over_similarity() {
        let store = MetadataStore::open_in_memory().unwrap();
        store.put(&sample_memory("a", "hash-1")).unwrap();
        let index = VectorIndex::with_config(VectorIndexConfig::new(4)).unwrap();

        let found = find_duplicate(&store, &index, "hash-1", &[0.0; 4], Some(0.9))
            .unwrap()
            .unwrap();
        assert_eq!(found.memory_id, "a");
        assert_eq!(found.score, 1.0);
    }

    #[test]
    fn no_hash_match_and_no_threshold_means_no_check() {
        let store = MetadataStore::open_in_memory().unwrap();
        let index = VectorIndex::with_config(VectorIndexConfig::new(4)).unwrap();
        let found = find_duplicate(&store, &index, "hash-x", &[0.0; 4], None).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn similarity_fallback_respects_threshold() {
        let store = MetadataStore::open_in_memory().unwrap();
        let mut index = VectorIndex::with_config(VectorIndexConfig::new(4)).unwrap();
        index.upsert("a", &[1.0, 0.0, 0.0, 0.0], "work").unwrap();

        let below = find_duplicate(&store, &index, "hash-miss", &[1.0, 0.0, 0.0, 0.0], Some(1.1))
            .unwrap();
        assert!(below.is_none());

        let above = find_duplicate(&store, &index, "hash-miss", &[1.0, 0.0, 0.0, 0.0], Some(0.9))
            .unwrap();
        assert!(above.is_some());
    }
}
