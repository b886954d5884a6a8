//! Retrain, arbitrate, promote and roll back the active artifact
//!
//! Only this manager writes the active slot. Every transition runs under a
//! single in-flight guard; a second caller gets `PromotionConflict` rather
//! than waiting. Before any artifact is overwritten the incumbent is made
//! durable in the backup slot.

use super::arbitration::{ArbitrationReport, Verdict, PROMOTION_MARGIN};
use crate::artifact::{
    retrain_from, validate_training_batch, ArtifactSlot, ArtifactStore, ModelArtifact,
    TrainedArtifact, TrainingConfig,
};
use crate::clock::{Clock, SystemClock};
use crate::error::{LifecycleError, LifecycleResult};
use crate::models::RawRecord;
use crate::tracking::measure_artifact;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Lifecycle states; terminal states fall back to `Stable`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Stable,
    Retraining,
    Arbitrating,
    Promoted,
    RolledBack,
    RetrainFailed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Stable => "STABLE",
            LifecycleState::Retraining => "RETRAINING",
            LifecycleState::Arbitrating => "ARBITRATING",
            LifecycleState::Promoted => "PROMOTED",
            LifecycleState::RolledBack => "ROLLED_BACK",
            LifecycleState::RetrainFailed => "RETRAIN_FAILED",
        };
        f.write_str(s)
    }
}

/// Configuration for the lifecycle manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Active artifact slot
    pub active_path: PathBuf,
    /// Backup slot; must differ from `active_path`
    pub backup_path: PathBuf,
    pub promotion_margin: f64,
    pub training: TrainingConfig,
}

impl LifecycleConfig {
    /// Active slot at `active_path`, backup at `<active_path>.backup`
    pub fn new(active_path: impl Into<PathBuf>) -> Self {
        let active_path = active_path.into();
        let backup_path = default_backup_path(&active_path);
        Self {
            active_path,
            backup_path,
            promotion_margin: PROMOTION_MARGIN,
            training: TrainingConfig::default(),
        }
    }

    pub fn with_backup_path(mut self, backup_path: impl Into<PathBuf>) -> Self {
        self.backup_path = backup_path.into();
        self
    }
}

/// `<path>.backup`
pub fn default_backup_path(active: &Path) -> PathBuf {
    let mut name = OsString::from(active.as_os_str());
    name.push(".backup");
    PathBuf::from(name)
}

/// Result of one full retrain → arbitrate → promote sequence
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No drift was signaled, nothing ran
    Skipped,
    Promoted {
        previous_version: String,
        promoted_version: String,
        report: ArbitrationReport,
    },
    Retained {
        incumbent_version: String,
        candidate_version: String,
        report: ArbitrationReport,
    },
    RetrainFailed {
        kind: &'static str,
        reason: String,
    },
}

impl CycleOutcome {
    fn failed(err: &LifecycleError) -> Self {
        CycleOutcome::RetrainFailed {
            kind: err.kind(),
            reason: err.to_string(),
        }
    }

    /// Branch text for summary alerts
    pub fn summary(&self) -> String {
        match self {
            CycleOutcome::Skipped => "retrain skipped".to_string(),
            CycleOutcome::Promoted { .. } => "candidate promoted".to_string(),
            CycleOutcome::Retained { .. } => "incumbent retained".to_string(),
            CycleOutcome::RetrainFailed { reason, .. } => format!("retrain failed: {}", reason),
        }
    }

    /// Stable label for logs and metrics
    pub fn branch(&self) -> &'static str {
        match self {
            CycleOutcome::Skipped => "skipped",
            CycleOutcome::Promoted { .. } => "promoted",
            CycleOutcome::Retained { .. } => "retained",
            CycleOutcome::RetrainFailed { .. } => "retrain_failed",
        }
    }
}

/// Held for the duration of one lifecycle transition
pub struct TransitionGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// The decision engine around the one active artifact
pub struct ModelLifecycleManager {
    config: LifecycleConfig,
    store: Arc<dyn ArtifactStore>,
    slot: ArtifactSlot,
    clock: Arc<dyn Clock>,
    in_flight: AtomicBool,
    state: Mutex<LifecycleState>,
    last_terminal: Mutex<Option<LifecycleState>>,
}

impl ModelLifecycleManager {
    pub fn new(config: LifecycleConfig, store: Arc<dyn ArtifactStore>, slot: ArtifactSlot) -> Self {
        Self {
            config,
            store,
            slot,
            clock: Arc::new(SystemClock),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(LifecycleState::Stable),
            last_terminal: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn slot(&self) -> &ArtifactSlot {
        &self.slot
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Terminal state reached by the most recent transition
    pub fn last_transition(&self) -> Option<LifecycleState> {
        *self
            .last_terminal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, state: LifecycleState) {
        debug!(state = %state, "Lifecycle state change");
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn finish(&self, terminal: LifecycleState) {
        *self
            .last_terminal
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(terminal);
        info!(terminal = %terminal, "Lifecycle transition finished");
        self.enter(LifecycleState::Stable);
    }

    /// Claim the single in-flight transition slot
    pub fn begin_transition(&self) -> LifecycleResult<TransitionGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| LifecycleError::PromotionConflict)?;
        Ok(TransitionGuard {
            flag: &self.in_flight,
        })
    }

    fn incumbent(&self) -> LifecycleResult<Arc<ModelArtifact>> {
        self.slot.current().ok_or(LifecycleError::ArtifactNotLoaded)
    }

    /// Load the active slot from the store into memory
    pub fn load_active(&self) -> LifecycleResult<Arc<ModelArtifact>> {
        let _guard = self.begin_transition()?;
        let artifact = Arc::new(self.store.load(&self.config.active_path)?);
        self.slot.replace(artifact.clone());
        info!(
            version = %artifact.version(),
            path = %self.config.active_path.display(),
            "Active artifact loaded"
        );
        Ok(artifact)
    }

    /// Make sure the backup slot holds `incumbent`
    fn ensure_backup(&self, incumbent: &ModelArtifact) -> LifecycleResult<()> {
        let path = &self.config.backup_path;
        let wanted = incumbent.fingerprint()?;
        if self.store.exists(path) {
            match self.store.load(path).and_then(|a| a.fingerprint()) {
                Ok(existing) if existing == wanted => {
                    debug!(version = %incumbent.version(), "Backup already current");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Existing backup unreadable, rewriting"),
            }
        }
        self.store.save(incumbent, path)?;
        info!(
            version = %incumbent.version(),
            path = %path.display(),
            "Incumbent backed up"
        );
        Ok(())
    }

    /// Train a candidate from a labeled batch. Does not touch the active slot.
    pub fn retrain(&self, batch: &[RawRecord], target: &str) -> LifecycleResult<TrainedArtifact> {
        let _guard = self.begin_transition()?;
        let result = self.retrain_locked(batch, target);
        match &result {
            Ok(_) => self.enter(LifecycleState::Stable),
            Err(_) => self.finish(LifecycleState::RetrainFailed),
        }
        result
    }

    fn retrain_locked(&self, batch: &[RawRecord], target: &str) -> LifecycleResult<TrainedArtifact> {
        self.enter(LifecycleState::Retraining);
        let incumbent = self.incumbent()?;

        // A rejected batch must leave both slots exactly as they were
        validate_training_batch(batch, target)?;
        self.ensure_backup(&incumbent)?;

        let trained = retrain_from(
            &incumbent,
            batch,
            target,
            &self.config.training,
            self.clock.now(),
        )
        .map_err(|e| {
            warn!(error = %e, kind = e.kind(), "Retrain failed");
            e
        })?;
        Ok(trained)
    }

    /// Compare candidate and incumbent on a labeled holdout.
    ///
    /// Returns `Err` only for a bad batch or a concurrent transition;
    /// every other failure yields the incumbent.
    pub fn arbitrate(
        &self,
        candidate: &ModelArtifact,
        test_batch: &[RawRecord],
        target: &str,
    ) -> LifecycleResult<ArbitrationReport> {
        let _guard = self.begin_transition()?;
        let report = self.arbitrate_locked(candidate, test_batch, target);
        self.enter(LifecycleState::Stable);
        report
    }

    fn arbitrate_locked(
        &self,
        candidate: &ModelArtifact,
        test_batch: &[RawRecord],
        target: &str,
    ) -> LifecycleResult<ArbitrationReport> {
        self.enter(LifecycleState::Arbitrating);
        let margin = self.config.promotion_margin;

        if test_batch.is_empty() {
            return Err(LifecycleError::InvalidInput(
                "arbitration batch is empty".to_string(),
            ));
        }
        if let Some(r) = test_batch.iter().find(|r| r.label(target).is_none()) {
            return Err(LifecycleError::InvalidInput(format!(
                "record {} has no binary '{}' label",
                r.record_id(),
                target
            )));
        }

        let incumbent = match self.incumbent() {
            Ok(a) => a,
            Err(e) => return Ok(ArbitrationReport::fallback(e.to_string(), margin)),
        };
        let measured = measure_artifact(&incumbent, test_batch, target).and_then(|inc| {
            measure_artifact(candidate, test_batch, target).map(|cand| (inc, cand))
        });
        let report = match measured {
            Ok((inc, cand)) => ArbitrationReport::measured(inc, cand, margin),
            Err(e) => {
                warn!(error = %e, "Arbitration failed, keeping incumbent");
                ArbitrationReport::fallback(e.to_string(), margin)
            }
        };

        info!(
            verdict = %report.verdict,
            incumbent = %incumbent.version(),
            candidate = %candidate.version(),
            incumbent_accuracy = report.incumbent.map(|m| m.accuracy),
            candidate_accuracy = report.candidate.map(|m| m.accuracy),
            incumbent_f1 = report.incumbent.map(|m| m.f1),
            candidate_f1 = report.candidate.map(|m| m.f1),
            "Arbitration complete"
        );
        Ok(report)
    }

    /// Make `candidate` the active artifact. Returns the superseded one.
    pub fn promote(&self, candidate: ModelArtifact) -> LifecycleResult<Option<Arc<ModelArtifact>>> {
        let _guard = self.begin_transition()?;
        let result = self.promote_locked(candidate);
        match &result {
            Ok(_) => self.finish(LifecycleState::Promoted),
            Err(_) => self.enter(LifecycleState::Stable),
        }
        result
    }

    fn promote_locked(&self, candidate: ModelArtifact) -> LifecycleResult<Option<Arc<ModelArtifact>>> {
        if let Some(incumbent) = self.slot.current() {
            self.ensure_backup(&incumbent)?;
        }
        self.store.save(&candidate, &self.config.active_path)?;

        let version = candidate.version().to_string();
        let previous = self.slot.replace(Arc::new(candidate));
        info!(
            from = previous.as_ref().map(|p| p.version()).unwrap_or("none"),
            to = %version,
            "Candidate promoted"
        );
        Ok(previous)
    }

    /// Restore the backup slot as the active artifact
    pub fn rollback(&self) -> LifecycleResult<Arc<ModelArtifact>> {
        let _guard = self.begin_transition()?;
        let restored = self.store.load(&self.config.backup_path)?;
        self.store.save(&restored, &self.config.active_path)?;

        let restored = Arc::new(restored);
        let previous = self.slot.replace(restored.clone());
        warn!(
            from = previous.as_ref().map(|p| p.version()).unwrap_or("none"),
            to = %restored.version(),
            "Rolled back to backup artifact"
        );
        self.finish(LifecycleState::RolledBack);
        Ok(restored)
    }

    /// Retrain → arbitrate on the retrain holdout → promote or retain.
    ///
    /// Only a concurrent transition is an `Err`; every other failure is
    /// reported as `RetrainFailed` with the incumbent left active.
    pub fn run_cycle(&self, batch: &[RawRecord], target: &str) -> LifecycleResult<CycleOutcome> {
        let _guard = self.begin_transition()?;

        let trained = match self.retrain_locked(batch, target) {
            Ok(t) => t,
            Err(e) => {
                self.finish(LifecycleState::RetrainFailed);
                return Ok(CycleOutcome::failed(&e));
            }
        };
        let incumbent_version = self
            .slot
            .current()
            .map(|a| a.version().to_string())
            .unwrap_or_default();
        let candidate_version = trained.artifact.version().to_string();

        let report = match self.arbitrate_locked(&trained.artifact, &trained.holdout, target) {
            Ok(r) => r,
            Err(e) => ArbitrationReport::fallback(e.to_string(), self.config.promotion_margin),
        };

        let outcome = if report.verdict == Verdict::Candidate {
            match self.promote_locked(trained.artifact) {
                Ok(_) => {
                    self.finish(LifecycleState::Promoted);
                    CycleOutcome::Promoted {
                        previous_version: incumbent_version,
                        promoted_version: candidate_version,
                        report,
                    }
                }
                Err(e) => {
                    error!(error = %e, "Promotion failed, incumbent left active");
                    self.finish(LifecycleState::RetrainFailed);
                    CycleOutcome::failed(&e)
                }
            }
        } else {
            self.finish(LifecycleState::RolledBack);
            CycleOutcome::Retained {
                incumbent_version,
                candidate_version,
                report,
            }
        };

        info!(branch = outcome.branch(), summary = %outcome.summary(), "Lifecycle cycle complete");
        Ok(outcome)
    }
}
