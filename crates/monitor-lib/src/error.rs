//! Error taxonomy for the model lifecycle core

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by scoring, tracking and lifecycle operations.
///
/// Per-record variants (`SchemaMismatch`) are isolated by batch paths;
/// lifecycle-level variants abort the calling operation and leave the
/// active artifact untouched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LifecycleError {
    /// A record or vector does not satisfy the artifact's feature contract.
    #[error("Schema mismatch on feature '{feature}': {reason}")]
    SchemaMismatch { feature: String, reason: String },

    /// A precondition on an evaluation or arbitration batch failed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not enough usable rows to retrain.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Scoring was attempted before any artifact was loaded.
    #[error("No model artifact loaded")]
    ArtifactNotLoaded,

    /// Another retrain/arbitrate/promote sequence is in flight.
    #[error("A lifecycle transition is already in progress")]
    PromotionConflict,

    /// Artifact store I/O or integrity failure.
    #[error("Persistence error at {path:?}: {reason}")]
    Persistence { path: PathBuf, reason: String },
}

impl LifecycleError {
    pub fn schema(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable label used in logs, metrics and summary alerts
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::SchemaMismatch { .. } => "schema_mismatch",
            LifecycleError::InvalidInput(_) => "invalid_input",
            LifecycleError::InsufficientData(_) => "insufficient_data",
            LifecycleError::ArtifactNotLoaded => "artifact_not_loaded",
            LifecycleError::PromotionConflict => "promotion_conflict",
            LifecycleError::Persistence { .. } => "persistence_error",
        }
    }
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
