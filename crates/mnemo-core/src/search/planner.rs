//! Search planner (C8).
//!
//! Query to ranked results, with scope expansion, diversification, and association
//! enrichment. Standard and diversified search share the same hydrate step; diversified
//! search additionally runs the greedy pairwise-dissimilarity selection loop described
//! below.

use std::collections::HashSet;

use crate::embeddings::{cosine_similarity, EmbeddingClient};
use crate::error::{MnemoError, Result};
use crate::graph::AssociationGraph;
use crate::model::Memory;
use crate::scope::ScopeFilter;
use crate::store::MetadataStore;
use crate::vector::VectorIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Standard,
    Diversified,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub scope: ScopeFilter,
    pub include_child_scopes: bool,
    pub limit: usize,
    pub similarity_threshold: f32,
    pub mode: SearchMode,
    pub include_associations: bool,
    pub association_limit: usize,
    pub diversity_threshold: f32,
    pub expansion_factor: f32,
    pub max_expansion: f32,
}

impl SearchOptions {
    pub fn new(scope: ScopeFilter, default_similarity_threshold: f32) -> Self {
        SearchOptions {
            scope,
            include_child_scopes: false,
            limit: 10,
            similarity_threshold: default_similarity_threshold,
            mode: SearchMode::Standard,
            include_associations: false,
            association_limit: 5,
            diversity_threshold: 0.8,
            expansion_factor: 2.5,
            max_expansion: 3.0,
        }
    }

    /// Resolve `{exact, include_child_scopes: true}` into a prefix filter.
    fn effective_scope(&self) -> ScopeFilter {
        match (&self.scope, self.include_child_scopes) {
            (ScopeFilter::Exact(s), true) => ScopeFilter::Prefix(s.clone()),
            (other, _) => other.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub memory: Memory,
    pub score: f32,
    pub associations: Vec<(String, f32)>,
}

pub struct SearchPlanner<'a> {
    pub embeddings: &'a EmbeddingClient,
    pub vector_index: &'a VectorIndex,
    pub metadata_store: &'a MetadataStore,
    pub graph: &'a AssociationGraph,
}

impl<'a> SearchPlanner<'a> {
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        if !(1..=100).contains(&options.limit) {
            return Err(MnemoError::validation("limit must be in [1, 100]"));
        }

        let query_vector = self.embeddings.embed(query)?;
        let scope_filter = options.effective_scope();

        let candidates = match options.mode {
            SearchMode::Standard => self.search_standard(&query_vector, options, &scope_filter)?,
            SearchMode::Diversified => {
                self.search_diversified(&query_vector, options, &scope_filter)?
            }
        };

        self.hydrate_and_rank(candidates, options)
    }

    fn search_standard(
        &self,
        query_vector: &[f32],
        options: &SearchOptions,
        scope_filter: &ScopeFilter,
    ) -> Result<Vec<(String, f32)>> {
        let raw = self
            .vector_index
            .query(query_vector, options.limit, scope_filter)
            .map_err(|e| MnemoError::state_inconsistency(format!("vector query failed: {e}")))?;

        Ok(raw
            .into_iter()
            .filter(|(_, score)| *score >= options.similarity_threshold)
            .collect())
    }

    fn search_diversified(
        &self,
        query_vector: &[f32],
        options: &SearchOptions,
        scope_filter: &ScopeFilter,
    ) -> Result<Vec<(String, f32)>> {
        let hard_cap = ((options.max_expansion * options.limit as f32).ceil() as usize).max(options.limit);
        let mut k = ((options.limit as f32 * options.expansion_factor).ceil() as usize).max(options.limit);

        loop {
            let k_capped = k.min(hard_cap);
            let raw = self
                .vector_index
                .query(query_vector, k_capped, scope_filter)
                .map_err(|e| MnemoError::state_inconsistency(format!("vector query failed: {e}")))?;

            let mut pool: Vec<(String, f32, Vec<f32>)> = Vec::new();
            for (id, score) in raw {
                if score < options.similarity_threshold {
                    continue;
                }
                if let Some(memory) = self.metadata_store.get(&id).map_err(|e| {
                    MnemoError::state_inconsistency(format!("metadata lookup failed: {e}"))
                })? {
                    if let Ok(vector) = self.embeddings.embed(&memory.content) {
                        pool.push((id, score, vector));
                    }
                }
            }

            let selected = greedy_diversify(pool, options.limit, options.diversity_threshold);

            if selected.len() >= options.limit || k_capped >= hard_cap {
                return Ok(selected.into_iter().map(|(id, score, _)| (id, score)).collect());
            }
            k *= 2;
        }
    }

    /// Hydrate candidate ids via the metadata store, apply the tie-break rule, and
    /// optionally attach neighbours from the association graph.
    fn hydrate_and_rank(
        &self,
        candidates: Vec<(String, f32)>,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::with_capacity(candidates.len());
        for (id, score) in candidates {
            let Some(memory) = self
                .metadata_store
                .get(&id)
                .map_err(|e| MnemoError::state_inconsistency(format!("metadata lookup failed: {e}")))?
            else {
                continue;
            };

            let associations = if options.include_associations {
                self.graph
                    .neighbours(&memory.id, options.association_limit, 0.0)
            } else {
                Vec::new()
            };

            hits.push(SearchHit {
                memory,
                score,
                associations,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.updated_at.cmp(&a.memory.updated_at))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });

        Ok(hits)
    }

    /// `discover_associations(memory_id, limit, similarity_threshold)`: graph neighbours
    /// as a fast path, backfilled by a diversified search over the whole index when
    /// short.
    pub fn discover_associations(
        &self,
        memory_id: &str,
        limit: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<(String, f32)>> {
        let mut found = self.graph.neighbours(memory_id, limit, similarity_threshold);
        if found.len() >= limit {
            found.truncate(limit);
            return Ok(found);
        }

        let Some(source) = self
            .metadata_store
            .get(memory_id)
            .map_err(|e| MnemoError::state_inconsistency(format!("metadata lookup failed: {e}")))?
        else {
            return Ok(found);
        };

        let mut exclude: HashSet<String> = found.iter().map(|(id, _)| id.clone()).collect();
        exclude.insert(memory_id.to_string());

        let remaining = limit - found.len();
        let options = SearchOptions {
            limit: remaining.max(1),
            similarity_threshold,
            mode: SearchMode::Diversified,
            ..SearchOptions::new(ScopeFilter::Any, similarity_threshold)
        };

        let backfill = self.search(&source.content, &options)?;
        for hit in backfill {
            if exclude.contains(&hit.memory.id) {
                continue;
            }
            exclude.insert(hit.memory.id.clone());
            found.push((hit.memory.id, hit.score));
            if found.len() >= limit {
                break;
            }
        }

        found.truncate(limit);
        Ok(found)
    }
}

/// Greedily pick the highest-scoring candidate, dropping anything too similar to it,
/// until `limit` is reached or the pool is exhausted.
fn greedy_diversify(
    mut pool: Vec<(String, f32, Vec<f32>)>,
    limit: usize,
    diversity_threshold: f32,
) -> Vec<(String, f32, Vec<f32>)> {
    pool.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected = Vec::new();
    while !pool.is_empty() && selected.len() < limit {
        let picked = pool.remove(0);
        pool.retain(|(_, _, vector)| cosine_similarity(&picked.2, vector) <= diversity_threshold);
        selected.push(picked);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greedy_diversify_keeps_dissimilar_candidates() {
        let pool = vec![
            ("a".to_string(), 0.95, vec![1.0, 0.0]),
            ("b".to_string(), 0.94, vec![0.99, 0.1]), // near-duplicate of "a"
            ("c".to_string(), 0.80, vec![0.0, 1.0]),  // dissimilar
        ];
        let selected = greedy_diversify(pool, 2, 0.9);
        let ids: Vec<&str> = selected.iter().map(|(id, _, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn greedy_diversify_respects_limit() {
        let pool = vec![
            ("a".to_string(), 0.9, vec![1.0, 0.0]),
            ("b".to_string(), 0.8, vec![0.0, 1.0]),
            ("c".to_string(), 0.7, vec![0.7, 0.7]),
        ];
        let selected = greedy_diversify(pool, 1, 0.5);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, "a");
    }
}
