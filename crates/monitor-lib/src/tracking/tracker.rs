//! Accuracy drift detection
//!
//! Drift is a single-step comparison of the two most recent snapshots:
//! `previous.accuracy - current.accuracy > threshold`. There is no trend
//! smoothing; promotion margins are calibrated against this exact rule.

use crate::artifact::ModelArtifact;
use crate::clock::{Clock, SystemClock};
use crate::error::{LifecycleError, LifecycleResult};
use crate::ml::ClassificationMetrics;
use crate::models::{PerformanceSnapshot, RawRecord};
use crate::predictor::{score_artifact, FeatureCodec, Predictor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Accuracy drop between consecutive snapshots that counts as drift
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.05;

/// Slack on the strict comparison so that a drop of exactly the threshold
/// (0.90 - 0.85) does not read as drift through binary rounding
const DRIFT_TOLERANCE: f64 = 1e-9;

/// Configuration for drift detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub drift_threshold: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
        }
    }
}

/// Details of the comparison behind a drift verdict
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftReport {
    pub previous_accuracy: f64,
    pub current_accuracy: f64,
    pub drop: f64,
    pub threshold: f64,
    pub drifting: bool,
}

/// Check that every record carries a binary `target` label
fn require_labels(batch: &[RawRecord], target: &str) -> LifecycleResult<Vec<u8>> {
    if batch.is_empty() {
        return Err(LifecycleError::InvalidInput(
            "labeled batch is empty".to_string(),
        ));
    }
    batch
        .iter()
        .map(|r| {
            r.label(target).ok_or_else(|| {
                LifecycleError::InvalidInput(format!(
                    "record {} has no binary '{}' label",
                    r.record_id(),
                    target
                ))
            })
        })
        .collect()
}

/// Measure `artifact` against a labeled batch.
///
/// Records the artifact cannot encode are skipped; if none can be scored
/// the batch is rejected.
pub fn measure_artifact(
    artifact: &ModelArtifact,
    batch: &[RawRecord],
    target: &str,
) -> LifecycleResult<ClassificationMetrics> {
    let labels = require_labels(batch, target)?;
    let codec = FeatureCodec::new();

    let mut truth = Vec::with_capacity(batch.len());
    let mut predicted = Vec::with_capacity(batch.len());
    for (raw, label) in batch.iter().zip(labels) {
        match score_artifact(&codec, artifact, raw) {
            Ok(scored) => {
                truth.push(label);
                predicted.push(scored.label);
            }
            Err(e) => debug!(record_id = %raw.record_id(), error = %e, "Record skipped in measurement"),
        }
    }
    if truth.is_empty() {
        return Err(LifecycleError::InvalidInput(format!(
            "none of {} records could be scored by {}",
            batch.len(),
            artifact.version()
        )));
    }
    Ok(ClassificationMetrics::compute(&truth, &predicted))
}

/// Owns the process-lifetime snapshot history
pub struct PerformanceTracker {
    config: TrackerConfig,
    history: Vec<PerformanceSnapshot>,
    clock: Arc<dyn Clock>,
}

impl PerformanceTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            history: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Score a labeled batch with the active predictor and append a snapshot
    pub fn evaluate(
        &mut self,
        predictor: &Predictor,
        batch: &[RawRecord],
        target: &str,
    ) -> LifecycleResult<PerformanceSnapshot> {
        let labels = require_labels(batch, target)?;
        let entries = predictor.score_batch(batch)?;

        let mut truth = Vec::with_capacity(entries.len());
        let mut predicted = Vec::with_capacity(entries.len());
        let mut model_version = None;
        let mut skipped = 0usize;
        for (entry, label) in entries.iter().zip(labels) {
            match entry {
                Ok(result) => {
                    truth.push(label);
                    predicted.push(result.prediction);
                    model_version.get_or_insert_with(|| result.model_version.clone());
                }
                Err(_) => skipped += 1,
            }
        }
        let Some(model_version) = model_version else {
            return Err(LifecycleError::InvalidInput(format!(
                "none of {} labeled records could be scored",
                batch.len()
            )));
        };
        if skipped > 0 {
            warn!(skipped, scored = truth.len(), "Unscorable records excluded from evaluation");
        }

        let metrics = ClassificationMetrics::compute(&truth, &predicted);
        let snapshot = PerformanceSnapshot {
            timestamp: self.clock.now(),
            accuracy: metrics.accuracy,
            f1_score: metrics.f1,
            sample_count: metrics.samples,
            model_version,
        };
        self.push_snapshot(snapshot.clone());

        info!(
            accuracy = snapshot.accuracy,
            f1 = snapshot.f1_score,
            samples = snapshot.sample_count,
            model_version = %snapshot.model_version,
            "Performance evaluated"
        );
        Ok(snapshot)
    }

    /// Append an externally measured snapshot
    pub fn push_snapshot(&mut self, snapshot: PerformanceSnapshot) {
        self.history.push(snapshot);
    }

    /// Comparison of the two most recent snapshots, if there are two
    pub fn drift_report(&self) -> Option<DriftReport> {
        let [.., previous, current] = self.history.as_slice() else {
            return None;
        };
        let drop = previous.accuracy - current.accuracy;
        Some(DriftReport {
            previous_accuracy: previous.accuracy,
            current_accuracy: current.accuracy,
            drop,
            threshold: self.config.drift_threshold,
            drifting: drop > self.config.drift_threshold + DRIFT_TOLERANCE,
        })
    }

    /// Drift verdict for the latest evaluation; does not re-evaluate
    pub fn is_drifting(&self) -> bool {
        self.drift_report().map_or(false, |r| r.drifting)
    }

    pub fn history(&self) -> &[PerformanceSnapshot] {
        &self.history
    }

    pub fn latest(&self) -> Option<&PerformanceSnapshot> {
        self.history.last()
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::test_support::{labeled_records, trained_artifact};
    use crate::artifact::ArtifactSlot;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};

    fn snapshot(accuracy: f64) -> PerformanceSnapshot {
        PerformanceSnapshot {
            timestamp: Utc::now(),
            accuracy,
            f1_score: 0.5,
            sample_count: 100,
            model_version: "v1".to_string(),
        }
    }

    fn tracker_with(accuracies: &[f64]) -> PerformanceTracker {
        let mut tracker = PerformanceTracker::default();
        for &a in accuracies {
            tracker.push_snapshot(snapshot(a));
        }
        tracker
    }

    #[test]
    fn test_drop_above_threshold_is_drift() {
        assert!(tracker_with(&[0.90, 0.84]).is_drifting());
    }

    #[test]
    fn test_drop_below_threshold_is_not_drift() {
        assert!(!tracker_with(&[0.90, 0.86]).is_drifting());
    }

    #[test]
    fn test_drop_of_exactly_threshold_is_not_drift() {
        assert!(!tracker_with(&[0.90, 0.85]).is_drifting());
        assert!(!tracker_with(&[90.0 / 100.0, 85.0 / 100.0]).is_drifting());
        assert!(!tracker_with(&[0.70, 0.65]).is_drifting());
        assert!(tracker_with(&[0.90, 0.849]).is_drifting());
    }

    #[test]
    fn test_single_snapshot_never_drifts() {
        assert!(!tracker_with(&[0.90]).is_drifting());
        assert!(!PerformanceTracker::default().is_drifting());
    }

    #[test]
    fn test_only_last_two_snapshots_count() {
        // Large cumulative decline, but each step is small
        assert!(!tracker_with(&[0.95, 0.91, 0.87, 0.83]).is_drifting());
        // Improvement after a drop clears the verdict
        assert!(!tracker_with(&[0.90, 0.80, 0.85]).is_drifting());
    }

    #[test]
    fn test_drift_report_values() {
        let report = tracker_with(&[0.90, 0.84]).drift_report().unwrap();
        assert!((report.drop - 0.06).abs() < 1e-9);
        assert_eq!(report.threshold, DEFAULT_DRIFT_THRESHOLD);
        assert!(report.drifting);
    }

    #[test]
    fn test_evaluate_rejects_empty_and_unlabeled() {
        let predictor = Predictor::new(ArtifactSlot::with_artifact(trained_artifact()));
        let mut tracker = PerformanceTracker::default();

        let err = tracker.evaluate(&predictor, &[], "is_active").unwrap_err();
        assert_eq!(err.kind(), "invalid_input");

        let mut records = labeled_records(10, 4);
        records[6].fields.remove("is_active");
        let err = tracker.evaluate(&predictor, &records, "is_active").unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert!(tracker.history().is_empty());
    }

    #[test]
    fn test_evaluate_appends_snapshots() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let predictor = Predictor::new(ArtifactSlot::with_artifact(trained_artifact()));
        let mut tracker = PerformanceTracker::default().with_clock(clock.clone());

        let records = labeled_records(80, 12);
        let first = tracker.evaluate(&predictor, &records, "is_active").unwrap();
        clock.advance(Duration::days(1));
        let second = tracker.evaluate(&predictor, &records, "is_active").unwrap();

        assert_eq!(tracker.history().len(), 2);
        assert_eq!(first.timestamp, start);
        assert_eq!(second.timestamp, start + Duration::days(1));
        assert_eq!(first.accuracy, second.accuracy);
        assert_eq!(first.sample_count, 80);
        assert!(!tracker.is_drifting());
        assert_eq!(tracker.latest(), Some(&second));
    }

    #[test]
    fn test_evaluate_without_artifact() {
        let predictor = Predictor::new(ArtifactSlot::new());
        let mut tracker = PerformanceTracker::default();
        let err = tracker
            .evaluate(&predictor, &labeled_records(10, 1), "is_active")
            .unwrap_err();
        assert_eq!(err, LifecycleError::ArtifactNotLoaded);
    }

    #[test]
    fn test_measure_artifact_matches_tracker() {
        let artifact = trained_artifact();
        let records = labeled_records(60, 33);
        let metrics = measure_artifact(&artifact, &records, "is_active").unwrap();

        let predictor = Predictor::new(ArtifactSlot::with_artifact(artifact));
        let snapshot = PerformanceTracker::default()
            .evaluate(&predictor, &records, "is_active")
            .unwrap();
        assert_eq!(metrics.accuracy, snapshot.accuracy);
        assert_eq!(metrics.f1, snapshot.f1_score);
    }
}
