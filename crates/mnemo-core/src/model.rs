//! Shared data model: [`Memory`] and [`Association`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::Metadata;

/// The unit of storage. Exactly one row exists in the metadata store, the vector index
/// (unless embedding is explicitly absent) and the association graph for a given `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub scope: String,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic tiebreak for timestamps that collide at the wall-clock's resolution.
    pub seq: i64,
    pub content_hash: String,
    pub has_embedding: bool,
}

/// `auto` (engine-created, via the association pass) or `manual` (caller-created).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    Auto,
    Manual,
}

impl std::fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssociationKind::Auto => write!(f, "auto"),
            AssociationKind::Manual => write!(f, "manual"),
        }
    }
}

/// A weighted undirected edge between two memories (C4 storage is canonical: the pair is
/// always stored with `min(a, b)` as `source_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub source_id: String,
    pub target_id: String,
    pub weight: f32,
    pub kind: AssociationKind,
    pub created_at: DateTime<Utc>,
}

impl Association {
    pub fn canonical_pair(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }
}
