//! Local semantic embeddings (C1 — embedding client).
//!
//! Uses fastembed for local ONNX inference. Default model is nomic-embed-text-v1.5
//! (768 dimensions, 8192 token context, Matryoshka support); vectors are truncated to
//! the configured dimension and L2-renormalised, matching the contract that `embed`
//! outputs unit vectors of a fixed dimension `D`.

use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use lru::LruCache;

#[cfg(feature = "embeddings")]
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::error::MnemoError;

pub const MAX_TEXT_LENGTH: usize = 8192;
pub const BATCH_SIZE: usize = 32;

#[cfg(feature = "embeddings")]
static EMBEDDING_MODEL_RESULT: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

#[cfg(feature = "embeddings")]
fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "mnemo") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

#[cfg(feature = "embeddings")]
fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, MnemoError> {
    let result = EMBEDDING_MODEL_RESULT.get_or_init(|| {
        let cache_dir = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!(error = %e, ?cache_dir, "failed to create fastembed cache directory");
        }
        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(false)
            .with_cache_dir(cache_dir);
        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("failed to initialise nomic-embed-text-v1.5: {e}"))
    });

    match result {
        Ok(model) => model.lock().map_err(|e| {
            MnemoError::EmbeddingUnavailable {
                message: format!("embedding model lock poisoned: {e}"),
            }
        }),
        Err(message) => Err(MnemoError::EmbeddingUnavailable {
            message: message.clone(),
        }),
    }
}

/// L2-normalise and truncate to `dimension` (Matryoshka truncation: the first N
/// dimensions of the source vector ARE a valid N-dimensional embedding).
#[inline]
pub fn matryoshka_truncate(mut vector: Vec<f32>, dimension: usize) -> Vec<f32> {
    if vector.len() > dimension {
        vector.truncate(dimension);
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// The embedding client (C1): `embed`/`embed_batch`, an exact-text LRU cache, and the
/// fixed output dimension `D`.
pub struct EmbeddingClient {
    dimension: usize,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingClient {
    pub fn new(dimension: usize, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size.max(1)).unwrap();
        EmbeddingClient {
            dimension,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Preflight check so the manager can log initialisation failures without doing
    /// embedding work yet.
    pub fn warm_up(&self) -> Result<(), MnemoError> {
        #[cfg(feature = "embeddings")]
        {
            get_model().map(|_| ())
        }
        #[cfg(not(feature = "embeddings"))]
        {
            Err(MnemoError::EmbeddingUnavailable {
                message: "crate built without the `embeddings` feature".to_string(),
            })
        }
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>, MnemoError> {
        if text.trim().is_empty() {
            return Err(MnemoError::EmbeddingInvalidInput {
                message: "text to embed must be non-empty".to_string(),
            });
        }

        if let Some(cached) = self.cache.lock().unwrap().get(text) {
            return Ok(cached.clone());
        }

        let vector = self.embed_uncached(text)?;
        self.cache.lock().unwrap().put(text.to_string(), vector.clone());
        Ok(vector)
    }

    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MnemoError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(texts.len());
        let mut misses: Vec<(usize, &str)> = Vec::new();
        {
            let mut cache = self.cache.lock().unwrap();
            for (i, text) in texts.iter().enumerate() {
                if text.trim().is_empty() {
                    return Err(MnemoError::EmbeddingInvalidInput {
                        message: format!("text at index {i} is empty"),
                    });
                }
                results.push(cache.get(text.as_str()).cloned());
                if results[i].is_none() {
                    misses.push((i, text.as_str()));
                }
            }
        }

        for chunk in misses.chunks(BATCH_SIZE) {
            let texts_chunk: Vec<&str> = chunk.iter().map(|(_, t)| *t).collect();
            let embedded = self.embed_batch_uncached(&texts_chunk)?;
            let mut cache = self.cache.lock().unwrap();
            for ((index, text), vector) in chunk.iter().zip(embedded.into_iter()) {
                cache.put((*text).to_string(), vector.clone());
                results[*index] = Some(vector);
            }
        }

        Ok(results.into_iter().map(|v| v.expect("every index filled")).collect())
    }

    #[cfg(feature = "embeddings")]
    fn embed_uncached(&self, text: &str) -> Result<Vec<f32>, MnemoError> {
        let mut model = get_model()?;
        let truncated = if text.len() > MAX_TEXT_LENGTH {
            &text[..MAX_TEXT_LENGTH]
        } else {
            text
        };
        let embeddings = model
            .embed(vec![truncated], None)
            .map_err(|e| MnemoError::EmbeddingUnavailable {
                message: format!("embedding generation failed: {e}"),
            })?;
        let raw = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| MnemoError::EmbeddingUnavailable {
                message: "embedding model returned no vectors".to_string(),
            })?;
        Ok(matryoshka_truncate(raw, self.dimension))
    }

    #[cfg(not(feature = "embeddings"))]
    fn embed_uncached(&self, _text: &str) -> Result<Vec<f32>, MnemoError> {
        Err(MnemoError::EmbeddingUnavailable {
            message: "crate built without the `embeddings` feature".to_string(),
        })
    }

    #[cfg(feature = "embeddings")]
    fn embed_batch_uncached(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, MnemoError> {
        let mut model = get_model()?;
        let truncated: Vec<&str> = texts
            .iter()
            .map(|t| if t.len() > MAX_TEXT_LENGTH { &t[..MAX_TEXT_LENGTH] } else { *t })
            .collect();
        let embeddings = model
            .embed(truncated, None)
            .map_err(|e| MnemoError::EmbeddingUnavailable {
                message: format!("batch embedding generation failed: {e}"),
            })?;
        Ok(embeddings
            .into_iter()
            .map(|v| matryoshka_truncate(v, self.dimension))
            .collect())
    }

    #[cfg(not(feature = "embeddings"))]
    fn embed_batch_uncached(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, MnemoError> {
        Err(MnemoError::EmbeddingUnavailable {
            message: "crate built without the `embeddings` feature".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors() {
        let a = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 0.0001);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.0001);
    }

    #[test]
    fn cosine_similarity_opposite_vectors() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-1.0, -2.0, -3.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 0.0001);
    }

    #[test]
    fn matryoshka_truncate_renormalises() {
        let vector = vec![3.0, 4.0, 5.0, 6.0];
        let truncated = matryoshka_truncate(vector, 2);
        assert_eq!(truncated.len(), 2);
        let norm = truncated.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.0001);
    }

    #[test]
    fn embed_rejects_empty_text() {
        let client = EmbeddingClient::new(256, 16);
        let err = client.embed("   ").unwrap_err();
        assert!(matches!(err, MnemoError::EmbeddingInvalidInput { .. }));
    }

    #[test]
    fn embed_batch_of_empty_input_is_empty_output() {
        let client = EmbeddingClient::new(256, 16);
        assert_eq!(client.embed_batch(&[]).unwrap().len(), 0);
    }
}
