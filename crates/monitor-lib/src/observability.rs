//! Observability infrastructure for the risk monitor
//!
//! Provides:
//! - Prometheus metrics (scoring latency, alert counts, drift, lifecycle transitions)
//! - Structured JSON logging with tracing

use crate::lifecycle::CycleOutcome;
use crate::storage::CompletenessReport;
use crate::tracking::DriftReport;
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_gauge, Gauge, GaugeVec, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for batch scoring latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    scoring_latency_seconds: Histogram,
    records_scored: IntCounter,
    scoring_errors: IntCounter,
    alerts_sent: IntCounter,
    alerts_suppressed: IntCounter,
    drift_evaluations: IntCounter,
    drift_detections: IntCounter,
    model_accuracy: Gauge,
    model_f1: Gauge,
    retrains_attempted: IntCounter,
    retrains_failed: IntCounter,
    promotions: IntCounter,
    rollbacks: IntCounter,
    incomplete_records: IntGauge,
    model_version_info: GaugeVec,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            scoring_latency_seconds: register_histogram!(
                "risk_monitor_scoring_latency_seconds",
                "Time spent scoring one record batch",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register scoring_latency_seconds"),

            records_scored: register_int_counter!(
                "risk_monitor_records_scored_total",
                "Total number of records scored successfully"
            )
            .expect("Failed to register records_scored"),

            scoring_errors: register_int_counter!(
                "risk_monitor_scoring_errors_total",
                "Total number of records that failed to score"
            )
            .expect("Failed to register scoring_errors"),

            alerts_sent: register_int_counter!(
                "risk_monitor_high_risk_alerts_sent_total",
                "Total number of high-risk alerts delivered"
            )
            .expect("Failed to register alerts_sent"),

            alerts_suppressed: register_int_counter!(
                "risk_monitor_high_risk_alerts_suppressed_total",
                "Total number of high-risk alerts suppressed by deduplication"
            )
            .expect("Failed to register alerts_suppressed"),

            drift_evaluations: register_int_counter!(
                "risk_monitor_drift_evaluations_total",
                "Total number of performance evaluations"
            )
            .expect("Failed to register drift_evaluations"),

            drift_detections: register_int_counter!(
                "risk_monitor_drift_detections_total",
                "Total number of evaluations that signaled drift"
            )
            .expect("Failed to register drift_detections"),

            model_accuracy: register_gauge!(
                "risk_monitor_model_accuracy",
                "Accuracy of the active model at the latest evaluation"
            )
            .expect("Failed to register model_accuracy"),

            model_f1: register_gauge!(
                "risk_monitor_model_f1",
                "F1 score of the active model at the latest evaluation"
            )
            .expect("Failed to register model_f1"),

            retrains_attempted: register_int_counter!(
                "risk_monitor_retrains_attempted_total",
                "Total number of retrain cycles started"
            )
            .expect("Failed to register retrains_attempted"),

            retrains_failed: register_int_counter!(
                "risk_monitor_retrains_failed_total",
                "Total number of retrain cycles that failed"
            )
            .expect("Failed to register retrains_failed"),

            promotions: register_int_counter!(
                "risk_monitor_promotions_total",
                "Total number of candidate promotions"
            )
            .expect("Failed to register promotions"),

            rollbacks: register_int_counter!(
                "risk_monitor_rollbacks_total",
                "Total number of cycles that kept the incumbent"
            )
            .expect("Failed to register rollbacks"),

            incomplete_records: register_int_gauge!(
                "risk_monitor_incomplete_records",
                "Records missing an id or a required feature at the latest quality check"
            )
            .expect("Failed to register incomplete_records"),

            model_version_info: register_gauge_vec!(
                "risk_monitor_model_version_info",
                "Information about the currently active model",
                &["version"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    /// Record one scored batch
    pub fn observe_batch(&self, duration_secs: f64, scored: usize, failed: usize) {
        let inner = self.inner();
        inner.scoring_latency_seconds.observe(duration_secs);
        inner.records_scored.inc_by(scored as u64);
        inner.scoring_errors.inc_by(failed as u64);
    }

    pub fn record_alerts(&self, sent: usize, suppressed: usize) {
        self.inner().alerts_sent.inc_by(sent as u64);
        self.inner().alerts_suppressed.inc_by(suppressed as u64);
    }

    /// Record a performance evaluation and its drift verdict
    pub fn record_evaluation(&self, accuracy: f64, f1: f64, drifting: bool) {
        let inner = self.inner();
        inner.drift_evaluations.inc();
        inner.model_accuracy.set(accuracy);
        inner.model_f1.set(f1);
        if drifting {
            inner.drift_detections.inc();
        }
    }

    /// Count the transitions of one lifecycle cycle
    pub fn record_cycle(&self, outcome: &CycleOutcome) {
        let inner = self.inner();
        match outcome {
            CycleOutcome::Skipped => {}
            CycleOutcome::Promoted {
                promoted_version, ..
            } => {
                inner.retrains_attempted.inc();
                inner.promotions.inc();
                self.set_model_version(promoted_version);
            }
            CycleOutcome::Retained { .. } => {
                inner.retrains_attempted.inc();
                inner.rollbacks.inc();
            }
            CycleOutcome::RetrainFailed { .. } => {
                inner.retrains_attempted.inc();
                inner.retrains_failed.inc();
            }
        }
    }

    pub fn set_incomplete_records(&self, count: usize) {
        self.inner().incomplete_records.set(count as i64);
    }

    /// Update model version info
    pub fn set_model_version(&self, version: &str) {
        self.inner().model_version_info.reset();
        self.inner()
            .model_version_info
            .with_label_values(&[version])
            .set(1.0);
    }
}

/// Structured logger for monitor events
///
/// Every event carries an `event` field and the instance name so log
/// pipelines can filter without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str, model_version: Option<&str>) {
        info!(
            event = "monitor_started",
            instance = %self.instance,
            monitor_version = %version,
            model_version = model_version.unwrap_or("none"),
            "Risk monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Risk monitor shutting down"
        );
    }

    /// Log a scored batch
    pub fn log_batch_scored(
        &self,
        scored: usize,
        failed: usize,
        high_risk: usize,
        model_version: &str,
        duration_ms: u128,
    ) {
        info!(
            event = "batch_scored",
            instance = %self.instance,
            scored = scored,
            failed = failed,
            high_risk = high_risk,
            model_version = %model_version,
            duration_ms = duration_ms as u64,
            "Scored record batch"
        );
    }

    /// Log a drift evaluation
    pub fn log_drift(&self, accuracy: f64, f1: f64, report: Option<&DriftReport>) {
        match report {
            Some(r) if r.drifting => {
                warn!(
                    event = "drift_evaluated",
                    instance = %self.instance,
                    accuracy = accuracy,
                    f1 = f1,
                    previous_accuracy = r.previous_accuracy,
                    drop = r.drop,
                    threshold = r.threshold,
                    drifting = true,
                    "Performance drift detected"
                );
            }
            Some(r) => {
                info!(
                    event = "drift_evaluated",
                    instance = %self.instance,
                    accuracy = accuracy,
                    f1 = f1,
                    previous_accuracy = r.previous_accuracy,
                    drop = r.drop,
                    threshold = r.threshold,
                    drifting = false,
                    "No drift detected"
                );
            }
            None => {
                info!(
                    event = "drift_evaluated",
                    instance = %self.instance,
                    accuracy = accuracy,
                    f1 = f1,
                    drifting = false,
                    "First evaluation recorded, no baseline yet"
                );
            }
        }
    }

    /// Log the branch taken by a lifecycle cycle
    pub fn log_lifecycle_outcome(&self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::RetrainFailed { kind, reason } => {
                error!(
                    event = "lifecycle_outcome",
                    instance = %self.instance,
                    branch = outcome.branch(),
                    error_kind = %kind,
                    reason = %reason,
                    "Retrain failed, incumbent kept"
                );
            }
            _ => {
                info!(
                    event = "lifecycle_outcome",
                    instance = %self.instance,
                    branch = outcome.branch(),
                    summary = %outcome.summary(),
                    "Lifecycle cycle finished"
                );
            }
        }
    }

    /// Log model update
    pub fn log_model_update(&self, old_version: &str, new_version: &str, success: bool) {
        if success {
            info!(
                event = "model_updated",
                instance = %self.instance,
                old_version = %old_version,
                new_version = %new_version,
                "Active model updated"
            );
        } else {
            warn!(
                event = "model_update_failed",
                instance = %self.instance,
                old_version = %old_version,
                new_version = %new_version,
                "Model update failed, keeping previous version"
            );
        }
    }

    /// Log a data-quality check
    pub fn log_data_quality(&self, report: &CompletenessReport) {
        if report.is_clean() {
            info!(
                event = "data_quality_checked",
                instance = %self.instance,
                total_records = report.total_records,
                "All records complete"
            );
        } else {
            warn!(
                event = "data_quality_checked",
                instance = %self.instance,
                total_records = report.total_records,
                missing_ids = report.missing_ids,
                incomplete_records = report.incomplete_records,
                missing_by_column = ?report.missing_by_column,
                "Incomplete records found"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_metrics_creation() {
        // The Prometheus registry is process-global; handles share it.
        let metrics = MonitorMetrics::new();
        let again = MonitorMetrics::new();

        metrics.observe_batch(0.05, 10, 1);
        metrics.record_alerts(2, 1);
        metrics.record_evaluation(0.91, 0.88, false);
        again.record_cycle(&CycleOutcome::RetrainFailed {
            kind: "insufficient_data",
            reason: "5 rows".to_string(),
        });
        again.set_incomplete_records(3);
        again.set_model_version("v2");
    }

    #[test]
    fn test_metrics_appear_in_registry() {
        MonitorMetrics::new().observe_batch(0.01, 1, 0);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "risk_monitor_records_scored_total"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "risk_monitor_scoring_latency_seconds"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance(), "test-instance");
        logger.log_lifecycle_outcome(&CycleOutcome::Skipped);
        logger.log_data_quality(&CompletenessReport::default());
    }
}
