//! Vector index module (C2).

mod index;

pub use index::{
    VectorIndex, VectorIndexConfig, VectorIndexError, VectorIndexStats, DEFAULT_CONNECTIVITY,
};
