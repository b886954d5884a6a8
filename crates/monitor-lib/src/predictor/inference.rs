//! Scoring against the active model artifact
//!
//! Every call takes one snapshot of the shared slot, so a whole batch is
//! scored by a single artifact even if a promotion lands mid-batch.

use super::features::FeatureCodec;
use super::output::{ResultFormatter, RiskThresholds};
use crate::artifact::{ArtifactSlot, ModelArtifact};
use crate::clock::{Clock, SystemClock};
use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{BatchEntry, PredictionResult, RawRecord, RecordError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Batch latency above which a warning is logged
const SLOW_BATCH_MS: u128 = 500;

/// Raw model output for one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    /// Predicted class label (0.5 threshold on P(label = 1))
    pub label: u8,
    /// Probability of the artifact's risk label
    pub risk_probability: f64,
}

/// Encode, scale and classify one record with a specific artifact.
///
/// The vector is always built from this artifact's own encoders and
/// feature order and scaled by its own scaler.
pub fn score_artifact(
    codec: &FeatureCodec,
    artifact: &ModelArtifact,
    raw: &RawRecord,
) -> LifecycleResult<Scored> {
    let vector = codec.encode(raw, artifact)?;
    let scaled = artifact.scaler().transform(&vector.values)?;
    let p_positive = artifact.model().predict_proba(&scaled)?;
    let label = u8::from(p_positive >= 0.5);
    let risk_probability = if artifact.risk_label() == 1 {
        p_positive
    } else {
        1.0 - p_positive
    };
    Ok(Scored {
        label,
        risk_probability,
    })
}

/// Scoring statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceStats {
    pub total_scored: u64,
    pub total_failed: u64,
    pub batches: u64,
}

/// Scores records against whichever artifact is currently active
pub struct Predictor {
    slot: ArtifactSlot,
    codec: FeatureCodec,
    formatter: ResultFormatter,
    clock: Arc<dyn Clock>,
    scored_count: AtomicU64,
    failed_count: AtomicU64,
    batch_count: AtomicU64,
}

impl Predictor {
    pub fn new(slot: ArtifactSlot) -> Self {
        Self {
            slot,
            codec: FeatureCodec::new(),
            formatter: ResultFormatter::new(),
            clock: Arc::new(SystemClock),
            scored_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
            batch_count: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_thresholds(mut self, thresholds: RiskThresholds) -> Self {
        self.formatter = ResultFormatter::with_thresholds(thresholds);
        self
    }

    pub fn slot(&self) -> &ArtifactSlot {
        &self.slot
    }

    pub fn codec(&self) -> &FeatureCodec {
        &self.codec
    }

    pub fn thresholds(&self) -> RiskThresholds {
        self.formatter.thresholds()
    }

    fn snapshot(&self) -> LifecycleResult<Arc<ModelArtifact>> {
        self.slot.current().ok_or(LifecycleError::ArtifactNotLoaded)
    }

    /// Score a single record
    pub fn score(&self, raw: &RawRecord) -> LifecycleResult<PredictionResult> {
        let artifact = self.snapshot()?;
        let result = self.score_with(&artifact, raw);
        match &result {
            Ok(_) => self.scored_count.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed_count.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    /// Score a batch. Per-record failures are isolated; only a missing
    /// artifact fails the whole call.
    pub fn score_batch(&self, records: &[RawRecord]) -> LifecycleResult<Vec<BatchEntry>> {
        let artifact = self.snapshot()?;
        let start = Instant::now();

        let entries: Vec<BatchEntry> = records
            .iter()
            .map(|raw| {
                self.score_with(&artifact, raw).map_err(|error| RecordError {
                    record_id: raw.record_id().to_string(),
                    error,
                })
            })
            .collect();

        let failed = entries.iter().filter(|e| e.is_err()).count() as u64;
        let scored = entries.len() as u64 - failed;
        self.scored_count.fetch_add(scored, Ordering::Relaxed);
        self.failed_count.fetch_add(failed, Ordering::Relaxed);
        self.batch_count.fetch_add(1, Ordering::Relaxed);

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_BATCH_MS {
            warn!(
                elapsed_ms = elapsed.as_millis(),
                records = records.len(),
                "Batch scoring exceeded {}ms",
                SLOW_BATCH_MS
            );
        } else {
            debug!(
                elapsed_us = elapsed.as_micros(),
                scored,
                failed,
                model_version = %artifact.version(),
                "Batch scored"
            );
        }
        Ok(entries)
    }

    fn score_with(&self, artifact: &ModelArtifact, raw: &RawRecord) -> LifecycleResult<PredictionResult> {
        let scored = score_artifact(&self.codec, artifact, raw)?;
        Ok(self.formatter.format(
            raw.record_id(),
            scored.label,
            scored.risk_probability,
            artifact.version(),
            self.clock.now(),
        ))
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_scored: self.scored_count.load(Ordering::Relaxed),
            total_failed: self.failed_count.load(Ordering::Relaxed),
            batches: self.batch_count.load(Ordering::Relaxed),
        }
    }
}
