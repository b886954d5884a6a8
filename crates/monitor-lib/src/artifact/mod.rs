//! Model artifact bundle and the shared active-artifact slot
//!
//! An artifact bundles a classifier with the scaler, encoders and feature
//! order it was trained with. All four always come from the same training
//! pass; constructors reject bundles whose parts disagree on width.

mod store;
mod training;

pub use store::{compute_checksum, ArtifactStore, FsArtifactStore, ARTIFACT_FORMAT_VERSION};
pub use training::{
    retrain_from, train_initial, validate_training_batch, FeatureSchema, TrainedArtifact,
    TrainingConfig, INITIAL_VERSION, MIN_TRAINING_ROWS,
};

use crate::error::{LifecycleError, LifecycleResult};
use crate::ml::{Classifier, LabelEncoder, Scaler};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Label whose probability is reported as risk for the `is_active` target (0 = dropout)
pub const DEFAULT_RISK_LABEL: u8 = 0;

/// The deployable unit: model, scaler, encoders and feature order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    version: String,
    model: Classifier,
    scaler: Scaler,
    encoders: BTreeMap<String, LabelEncoder>,
    feature_names: Vec<String>,
    risk_label: u8,
    trained_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retrained_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    holdout_accuracy: Option<f64>,
}

impl ModelArtifact {
    /// Assemble an artifact from parts fitted in one training pass
    pub fn from_parts(
        version: impl Into<String>,
        model: Classifier,
        scaler: Scaler,
        encoders: BTreeMap<String, LabelEncoder>,
        feature_names: Vec<String>,
        risk_label: u8,
        trained_at: DateTime<Utc>,
    ) -> LifecycleResult<Self> {
        let artifact = Self {
            version: version.into(),
            model,
            scaler,
            encoders,
            feature_names,
            risk_label,
            trained_at,
            retrained_at: None,
            holdout_accuracy: None,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Check the artifact's internal contract: every fitted part agrees on
    /// the feature width, and every encoder covers a listed column with at
    /// least one known category.
    pub fn validate(&self) -> LifecycleResult<()> {
        let width = self.feature_names.len();
        if width == 0 {
            return Err(LifecycleError::schema("<contract>", "empty feature list"));
        }
        if self.scaler.width() != width {
            return Err(LifecycleError::schema(
                "<contract>",
                format!("scaler width {} != {} features", self.scaler.width(), width),
            ));
        }
        if self.model.width() != width {
            return Err(LifecycleError::schema(
                "<contract>",
                format!("model width {} != {} features", self.model.width(), width),
            ));
        }
        for (name, encoder) in &self.encoders {
            if !self.feature_names.contains(name) {
                return Err(LifecycleError::schema(
                    name.as_str(),
                    "encoder for a column outside the feature list",
                ));
            }
            if encoder.classes().is_empty() {
                return Err(LifecycleError::schema(
                    name.as_str(),
                    "encoder has no known categories",
                ));
            }
        }
        if self.risk_label > 1 {
            return Err(LifecycleError::InvalidInput(format!(
                "risk label must be 0 or 1, got {}",
                self.risk_label
            )));
        }
        Ok(())
    }

    pub(crate) fn mark_retrained(mut self, at: DateTime<Utc>) -> Self {
        self.retrained_at = Some(at);
        self
    }

    pub(crate) fn with_holdout_accuracy(mut self, accuracy: f64) -> Self {
        self.holdout_accuracy = Some(accuracy);
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn model(&self) -> &Classifier {
        &self.model
    }

    pub fn scaler(&self) -> &Scaler {
        &self.scaler
    }

    pub fn encoders(&self) -> &BTreeMap<String, LabelEncoder> {
        &self.encoders
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn risk_label(&self) -> u8 {
        self.risk_label
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn retrained_at(&self) -> Option<DateTime<Utc>> {
        self.retrained_at
    }

    pub fn holdout_accuracy(&self) -> Option<f64> {
        self.holdout_accuracy
    }

    /// Canonical JSON encoding used for checksums and persistence
    pub fn canonical_bytes(&self) -> LifecycleResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| LifecycleError::persistence("<memory>", format!("serialize: {}", e)))
    }

    /// SHA-256 of the canonical encoding
    pub fn fingerprint(&self) -> LifecycleResult<String> {
        Ok(compute_checksum(&self.canonical_bytes()?))
    }
}

/// Version label for the artifact that supersedes `current`
pub fn next_version(current: &str) -> String {
    match current.strip_prefix('v').and_then(|n| n.parse::<u32>().ok()) {
        Some(n) => format!("v{}", n + 1),
        None => format!("{}-retrained", current),
    }
}

/// Shared handle to the one active artifact.
///
/// Readers take a cheap `Arc` snapshot and keep scoring against it even if
/// a promotion swaps the slot meanwhile; the write lock is held only for
/// the pointer update.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSlot {
    inner: Arc<RwLock<Option<Arc<ModelArtifact>>>>,
}

impl ArtifactSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(artifact: ModelArtifact) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(Arc::new(artifact)))),
        }
    }

    /// Snapshot of the active artifact
    pub fn current(&self) -> Option<Arc<ModelArtifact>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    /// Swap in a new artifact, returning the superseded one
    pub(crate) fn replace(&self, next: Arc<ModelArtifact>) -> Option<Arc<ModelArtifact>> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.replace(next)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{ClassifierSpec, ScalerKind};

    fn tiny_parts() -> (Classifier, Scaler) {
        let rows = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.2, 0.9], vec![0.9, 0.1]];
        let model = ClassifierSpec::logistic().fit(&rows, &[0, 1, 0, 1]).unwrap();
        let scaler = Scaler::fit(ScalerKind::Standard, &rows).unwrap();
        (model, scaler)
    }

    #[test]
    fn test_from_parts_rejects_width_mismatch() {
        let (model, scaler) = tiny_parts();
        let err = ModelArtifact::from_parts(
            "v1",
            model,
            scaler,
            BTreeMap::new(),
            vec!["only_one".to_string()],
            0,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "schema_mismatch");
    }

    #[test]
    fn test_from_parts_rejects_foreign_encoder() {
        let (model, scaler) = tiny_parts();
        let mut encoders = BTreeMap::new();
        encoders.insert("gender".to_string(), LabelEncoder::fit(["F", "M"]).unwrap());
        let result = ModelArtifact::from_parts(
            "v1",
            model,
            scaler,
            encoders,
            vec!["a".to_string(), "b".to_string()],
            0,
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_next_version() {
        assert_eq!(next_version("v1"), "v2");
        assert_eq!(next_version("v41"), "v42");
        assert_eq!(next_version("baseline"), "baseline-retrained");
    }

    #[test]
    fn test_fingerprint_stable() {
        let artifact = test_support::trained_artifact();
        assert_eq!(artifact.fingerprint().unwrap(), artifact.fingerprint().unwrap());
        assert_eq!(artifact.fingerprint().unwrap().len(), 64);
    }

    #[test]
    fn test_slot_swap_keeps_reader_snapshot() {
        let first = test_support::trained_artifact();
        let slot = ArtifactSlot::with_artifact(first.clone());
        let snapshot = slot.current().unwrap();

        let second = first.clone().mark_retrained(Utc::now());
        let previous = slot.replace(Arc::new(second));

        assert_eq!(previous.as_deref(), Some(&first));
        assert_eq!(*snapshot, first);
        assert!(slot.current().unwrap().retrained_at().is_some());
    }

    #[test]
    fn test_empty_slot() {
        let slot = ArtifactSlot::new();
        assert!(!slot.is_loaded());
        assert!(slot.current().is_none());
    }
}
