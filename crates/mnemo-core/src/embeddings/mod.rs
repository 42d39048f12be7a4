//! Embedding client (C1).
//!
//! Text to unit vector, pluggable, with LRU caching and rate-limit-aware error kinds.

mod local;

pub use local::{
    cosine_similarity, dot_product, euclidean_distance, matryoshka_truncate, EmbeddingClient,
};
