//! The recurring jobs driven by the scheduler
//!
//! `DailyPredictionJob` composes the whole lifecycle loop: score the
//! recently updated population, alert on high risk, evaluate against the
//! labeled population, retrain and arbitrate on drift, then send the
//! daily summary whatever branch was taken. `DataQualityJob` reports
//! record completeness.

use super::scheduler::{ComponentIssue, Task, TaskReport};
use crate::alerting::{AlertStats, Alerter, DailySummary};
use crate::health::components;
use crate::lifecycle::{CycleOutcome, ModelLifecycleManager};
use crate::models::{PredictionResult, RiskBand};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::predictor::Predictor;
use crate::storage::{CompletenessReport, RecordStore};
use crate::tracking::{DriftReport, PerformanceTracker};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Daily job configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyJobConfig {
    /// Label column used for evaluation and retraining
    pub target_column: String,
    /// Records updated within this window are scored (default: 24 hours)
    pub lookback: Duration,
}

impl Default for DailyJobConfig {
    fn default() -> Self {
        Self {
            target_column: "is_active".to_string(),
            lookback: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// A run that could not produce a summary
#[derive(Debug)]
pub struct JobFailure {
    pub component: &'static str,
    pub error: anyhow::Error,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.component, self.error)
    }
}

impl std::error::Error for JobFailure {}

/// Everything one daily run did
#[derive(Debug, Clone)]
pub struct DailyReport {
    pub results: Vec<PredictionResult>,
    pub saved: usize,
    pub alerts: AlertStats,
    pub drift: Option<DriftReport>,
    pub outcome: CycleOutcome,
    pub summary: DailySummary,
    pub summary_delivered: bool,
    pub issues: Vec<ComponentIssue>,
}

/// Score, evaluate, retrain on drift, alert
pub struct DailyPredictionJob {
    config: DailyJobConfig,
    store: Arc<dyn RecordStore>,
    predictor: Arc<Predictor>,
    tracker: PerformanceTracker,
    manager: Arc<ModelLifecycleManager>,
    alerter: Arc<Alerter>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl DailyPredictionJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DailyJobConfig,
        store: Arc<dyn RecordStore>,
        predictor: Arc<Predictor>,
        tracker: PerformanceTracker,
        manager: Arc<ModelLifecycleManager>,
        alerter: Arc<Alerter>,
        metrics: MonitorMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            config,
            store,
            predictor,
            tracker,
            manager,
            alerter,
            metrics,
            logger,
        }
    }

    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut PerformanceTracker {
        &mut self.tracker
    }

    /// One full daily pass.
    ///
    /// Fails only when the population cannot be fetched or no artifact is
    /// loaded; every later step degrades instead of aborting.
    pub fn run_once(&mut self, now: DateTime<Utc>) -> Result<DailyReport, JobFailure> {
        let target = self.config.target_column.clone();
        let mut issues = Vec::new();

        let lookback = ChronoDuration::from_std(self.config.lookback)
            .unwrap_or_else(|_| ChronoDuration::hours(24));
        let records = self
            .store
            .fetch_updated_since(now - lookback)
            .map_err(|error| JobFailure {
                component: components::STORAGE,
                error: error.context("fetching updated records"),
            })?;

        let start = Instant::now();
        let entries = self
            .predictor
            .score_batch(&records)
            .map_err(|e| JobFailure {
                component: components::PREDICTOR,
                error: e.into(),
            })?;
        let elapsed = start.elapsed();

        let mut results = Vec::with_capacity(entries.len());
        let mut failed = 0usize;
        for entry in entries {
            match entry {
                Ok(result) => results.push(result),
                Err(e) => {
                    failed += 1;
                    warn!(record_id = %e.record_id, error = %e.error, "Record could not be scored");
                }
            }
        }
        let high = results.iter().filter(|r| r.risk_band == RiskBand::High).count();
        let model_version = results
            .first()
            .map(|r| r.model_version.clone())
            .or_else(|| self.predictor.slot().current().map(|a| a.version().to_string()))
            .unwrap_or_default();
        self.metrics
            .observe_batch(elapsed.as_secs_f64(), results.len(), failed);
        self.logger
            .log_batch_scored(results.len(), failed, high, &model_version, elapsed.as_millis());
        if failed > 0 {
            issues.push(ComponentIssue::degraded(
                components::PREDICTOR,
                format!("{} of {} records failed to score", failed, records.len()),
            ));
        }

        let saved = match self.store.save_predictions(&results) {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "Saving predictions failed");
                issues.push(ComponentIssue::degraded(
                    components::STORAGE,
                    format!("saving predictions failed: {:#}", e),
                ));
                0
            }
        };

        let alerts = self.alerter.notify_high_risk(&results);
        self.metrics.record_alerts(alerts.sent, alerts.suppressed);
        if alerts.failed > 0 {
            issues.push(ComponentIssue::degraded(
                components::ALERTING,
                format!("{} high-risk alerts failed", alerts.failed),
            ));
        }

        let (drift, outcome) = self.evaluate_and_cycle(&target, &mut issues);

        let mut summary = DailySummary {
            date: now.date_naive(),
            total_scored: 0,
            failed,
            low: 0,
            medium: 0,
            high: 0,
            alerts_sent: alerts.sent,
            alerts_suppressed: alerts.suppressed,
            drift,
            lifecycle: outcome.summary(),
        };
        summary.tally(&results);
        let summary_delivered = self.alerter.send_summary(&summary);
        if !summary_delivered {
            issues.push(ComponentIssue::degraded(
                components::ALERTING,
                "daily summary delivery failed",
            ));
        }

        info!(
            scored = summary.total_scored,
            failed,
            high_risk = summary.high,
            saved,
            branch = outcome.branch(),
            "Daily prediction run complete"
        );

        Ok(DailyReport {
            results,
            saved,
            alerts,
            drift,
            outcome,
            summary,
            summary_delivered,
            issues,
        })
    }

    /// Evaluate against labeled records and run a lifecycle cycle if drifting
    fn evaluate_and_cycle(
        &mut self,
        target: &str,
        issues: &mut Vec<ComponentIssue>,
    ) -> (Option<DriftReport>, CycleOutcome) {
        let labeled = match self.store.fetch_labeled(target) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "Fetching labeled records failed, skipping evaluation");
                issues.push(ComponentIssue::degraded(
                    components::STORAGE,
                    format!("fetching labeled records failed: {:#}", e),
                ));
                return (None, CycleOutcome::Skipped);
            }
        };
        if labeled.is_empty() {
            info!(target = %target, "No labeled records, skipping evaluation");
            return (None, CycleOutcome::Skipped);
        }

        let snapshot = match self.tracker.evaluate(&self.predictor, &labeled, target) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Evaluation failed");
                return (None, CycleOutcome::Skipped);
            }
        };
        let drift = self.tracker.drift_report();
        let drifting = self.tracker.is_drifting();
        self.metrics
            .record_evaluation(snapshot.accuracy, snapshot.f1_score, drifting);
        self.logger
            .log_drift(snapshot.accuracy, snapshot.f1_score, drift.as_ref());

        if !drifting {
            return (drift, CycleOutcome::Skipped);
        }

        let outcome = match self.manager.run_cycle(&labeled, target) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Lifecycle cycle could not start");
                CycleOutcome::RetrainFailed {
                    kind: e.kind(),
                    reason: e.to_string(),
                }
            }
        };

        self.metrics.record_cycle(&outcome);
        self.logger.log_lifecycle_outcome(&outcome);
        match &outcome {
            CycleOutcome::Promoted {
                previous_version,
                promoted_version,
                ..
            } => self
                .logger
                .log_model_update(previous_version, promoted_version, true),
            CycleOutcome::RetrainFailed { kind, .. } => {
                issues.push(ComponentIssue::degraded(
                    components::ARTIFACT_STORE,
                    format!("retrain failed ({})", kind),
                ));
            }
            _ => {}
        }
        (drift, outcome)
    }
}

impl Task for DailyPredictionJob {
    fn name(&self) -> &str {
        "daily_prediction"
    }

    fn components(&self) -> &'static [&'static str] {
        &[
            components::PREDICTOR,
            components::STORAGE,
            components::ALERTING,
            components::ARTIFACT_STORE,
        ]
    }

    fn run(&mut self, now: DateTime<Utc>) -> TaskReport {
        match self.run_once(now) {
            Ok(report) => TaskReport {
                issues: report.issues,
            },
            Err(failure) => {
                error!(component = failure.component, error = %failure, "Daily prediction run failed");
                TaskReport::with_issue(ComponentIssue::unhealthy(
                    failure.component,
                    failure.to_string(),
                ))
            }
        }
    }
}

/// Hourly completeness check over the stored population
pub struct DataQualityJob {
    store: Arc<dyn RecordStore>,
    required: Vec<String>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl DataQualityJob {
    pub fn new(
        store: Arc<dyn RecordStore>,
        required: Vec<String>,
        metrics: MonitorMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            store,
            required,
            metrics,
            logger,
        }
    }

    pub fn check(&self) -> anyhow::Result<CompletenessReport> {
        let report = self.store.completeness(&self.required)?;
        self.metrics
            .set_incomplete_records(report.incomplete_records + report.missing_ids);
        self.logger.log_data_quality(&report);
        Ok(report)
    }
}

impl Task for DataQualityJob {
    fn name(&self) -> &str {
        "data_quality"
    }

    fn components(&self) -> &'static [&'static str] {
        &[components::STORAGE]
    }

    fn run(&mut self, _now: DateTime<Utc>) -> TaskReport {
        match self.check() {
            Ok(report) if report.is_clean() => TaskReport::ok(),
            Ok(report) => TaskReport::with_issue(ComponentIssue::degraded(
                components::STORAGE,
                format!(
                    "{} of {} records incomplete, {} missing an id",
                    report.incomplete_records, report.total_records, report.missing_ids
                ),
            )),
            Err(e) => {
                error!(error = %e, "Data quality check failed");
                TaskReport::with_issue(ComponentIssue::unhealthy(
                    components::STORAGE,
                    format!("completeness query failed: {:#}", e),
                ))
            }
        }
    }
}
