//! Crate-wide error taxonomy.
//!
//! `MnemoError` is the single error type returned by every `Engine` operation. Per-store
//! errors ([`crate::vector::VectorIndexError`], [`crate::store::StoreError`],
//! [`crate::graph::GraphError`]) are distinct types that convert into it at the manager
//! boundary; nothing downstream of the manager should ever construct a raw per-store
//! error for a caller.

use serde_json::Value as Json;
use std::fmt;

/// The stores a multi-store write can touch, used to report which legs committed and
/// which were rolled back when [`MnemoError::StoreFailed`] is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StoreKind {
    VectorIndex,
    MetadataStore,
    AssociationGraph,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::VectorIndex => write!(f, "vector_index"),
            StoreKind::MetadataStore => write!(f, "metadata_store"),
            StoreKind::AssociationGraph => write!(f, "association_graph"),
        }
    }
}

/// Taxonomy from the error handling design: every operation returns one of these kinds,
/// never a bare string.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MnemoError {
    #[error("validation failed: {message}")]
    ValidationFailed { message: String, details: Json },

    #[error("not found: {message}")]
    NotFound { message: String, details: Json },

    #[error("duplicate rejected: {message}")]
    DuplicateRejected {
        message: String,
        candidate_id: String,
        score: f32,
    },

    #[error("embedding unavailable: {message}")]
    EmbeddingUnavailable { message: String },

    #[error("embedding rejected input: {message}")]
    EmbeddingInvalidInput { message: String },

    #[error("store failed: {message}")]
    StoreFailed {
        message: String,
        which: StoreKind,
        committed: Vec<StoreKind>,
        rolled_back: Vec<StoreKind>,
    },

    #[error("state inconsistency: {message}")]
    StateInconsistency { message: String, details: Json },

    #[error("capacity exceeded: {message}")]
    CapacityExceeded { message: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl MnemoError {
    pub fn validation(message: impl Into<String>) -> Self {
        MnemoError::ValidationFailed {
            message: message.into(),
            details: Json::Null,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        MnemoError::NotFound {
            message: message.into(),
            details: Json::Null,
        }
    }

    pub fn state_inconsistency(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(%message, "state inconsistency invariant violated");
        MnemoError::StateInconsistency {
            message,
            details: Json::Null,
        }
    }

    /// `details.retryable`: a caller-facing hint, not a stored field.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            MnemoError::EmbeddingUnavailable { .. } | MnemoError::StoreFailed { .. }
        )
    }

    /// The structured error kind name, as it would appear in `details.kind` of an error
    /// envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            MnemoError::ValidationFailed { .. } => "ValidationFailed",
            MnemoError::NotFound { .. } => "NotFound",
            MnemoError::DuplicateRejected { .. } => "DuplicateRejected",
            MnemoError::EmbeddingUnavailable { .. } => "EmbeddingUnavailable",
            MnemoError::EmbeddingInvalidInput { .. } => "EmbeddingInvalidInput",
            MnemoError::StoreFailed { .. } => "StoreFailed",
            MnemoError::StateInconsistency { .. } => "StateInconsistency",
            MnemoError::CapacityExceeded { .. } => "CapacityExceeded",
            MnemoError::Cancelled => "Cancelled",
        }
    }
}

impl From<crate::value::ValueError> for MnemoError {
    fn from(err: crate::value::ValueError) -> Self {
        match err {
            crate::value::ValueError::StringTooLong { .. } => MnemoError::validation(err.to_string()),
            crate::value::ValueError::TooDeep { .. } | crate::value::ValueError::TooManyLeaves { .. } => {
                MnemoError::CapacityExceeded { message: err.to_string() }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, MnemoError>;

/// Check a cancellation token at a suspension point, returning `MnemoError::Cancelled`
/// if it's already been fired.
pub fn check_cancelled(cancel: &tokio_util::sync::CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(MnemoError::Cancelled)
    } else {
        Ok(())
    }
}
