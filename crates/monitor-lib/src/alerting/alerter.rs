//! High-risk alert routing with deduplication
//!
//! Each record id is alerted at most once per dedup window. Delivery
//! failures are logged and counted; they never fail the caller.

use super::messages::{
    high_risk_message, summary_message, DailySummary, HIGH_RISK_SUBJECT, SUMMARY_SUBJECT,
};
use super::AlertSink;
use crate::clock::{Clock, SystemClock};
use crate::models::{PredictionResult, RiskBand};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Default deduplication window (1 hour)
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Alert routing configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    pub mentor_recipient: String,
    pub admin_recipient: String,
    pub dedup_window: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            mentor_recipient: "mentor@school.edu".to_string(),
            admin_recipient: "admin@school.edu".to_string(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

/// Counts from one alerting pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertStats {
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
}

/// Alert emitter with deduplication
pub struct Alerter {
    config: AlertConfig,
    sink: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    /// Recent alerts for deduplication (record id -> last emission time)
    recent_alerts: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl Alerter {
    pub fn new(config: AlertConfig, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            config,
            sink,
            clock: Arc::new(SystemClock),
            recent_alerts: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    fn window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.dedup_window)
            .unwrap_or_else(|_| chrono::Duration::days(36_500))
    }

    /// Check if an alert for `record_id` should be suppressed
    pub fn should_suppress(&self, record_id: &str) -> bool {
        let now = self.clock.now();
        let alerts = self
            .recent_alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        alerts
            .get(record_id)
            .map_or(false, |last| now - *last < self.window())
    }

    fn record_alert(&self, record_id: &str) {
        let now = self.clock.now();
        let window = self.window();
        let mut alerts = self
            .recent_alerts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        alerts.insert(record_id.to_string(), now);
        alerts.retain(|_, last| now - *last < window);
    }

    /// Alert the mentor for every High-band result
    pub fn notify_high_risk(&self, results: &[PredictionResult]) -> AlertStats {
        let mut stats = AlertStats::default();
        for result in results.iter().filter(|r| r.risk_band == RiskBand::High) {
            if self.should_suppress(&result.record_id) {
                debug!(record_id = %result.record_id, "High-risk alert suppressed");
                stats.suppressed += 1;
                continue;
            }
            let message = high_risk_message(result);
            match self
                .sink
                .send(&self.config.mentor_recipient, HIGH_RISK_SUBJECT, &message)
            {
                Ok(()) => {
                    self.record_alert(&result.record_id);
                    stats.sent += 1;
                }
                Err(e) => {
                    warn!(record_id = %result.record_id, error = %e, "High-risk alert delivery failed");
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    /// Send the daily summary to the administrator
    pub fn send_summary(&self, summary: &DailySummary) -> bool {
        let message = summary_message(summary);
        match self
            .sink
            .send(&self.config.admin_recipient, SUMMARY_SUBJECT, &message)
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Daily summary delivery failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::MemoryAlertSink;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    struct FailingSink;

    impl AlertSink for FailingSink {
        fn send(&self, _recipient: &str, _subject: &str, _message: &str) -> anyhow::Result<()> {
            anyhow::bail!("smtp unavailable")
        }
    }

    fn result(id: &str, band: RiskBand) -> PredictionResult {
        PredictionResult {
            record_id: id.to_string(),
            prediction: 0,
            probability: 0.9,
            risk_band: band,
            model_version: "v1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_only_high_band_is_alerted() {
        let sink = Arc::new(MemoryAlertSink::new());
        let alerter = Alerter::new(AlertConfig::default(), sink.clone());
        let stats = alerter.notify_high_risk(&[
            result("a", RiskBand::Low),
            result("b", RiskBand::Medium),
            result("c", RiskBand::High),
        ]);
        assert_eq!(stats.sent, 1);

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "mentor@school.edu");
        assert_eq!(sent[0].subject, HIGH_RISK_SUBJECT);
        assert!(sent[0].message.contains("Student ID: c"));
    }

    #[test]
    fn test_deduplication() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let sink = Arc::new(MemoryAlertSink::new());
        let alerter = Alerter::new(AlertConfig::default(), sink.clone()).with_clock(clock.clone());
        let batch = [result("c", RiskBand::High)];

        assert_eq!(alerter.notify_high_risk(&batch).sent, 1);
        clock.advance(chrono::Duration::minutes(30));
        let stats = alerter.notify_high_risk(&batch);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.sent, 0);

        clock.advance(chrono::Duration::minutes(31));
        assert_eq!(alerter.notify_high_risk(&batch).sent, 1);
        assert_eq!(sink.sent().len(), 2);
    }

    #[test]
    fn test_delivery_failure_is_counted_not_raised() {
        let alerter = Alerter::new(AlertConfig::default(), Arc::new(FailingSink));
        let stats = alerter.notify_high_risk(&[result("c", RiskBand::High)]);
        assert_eq!(stats.failed, 1);
        // Failed deliveries are not recorded for dedup
        assert!(!alerter.should_suppress("c"));
        assert!(!alerter.send_summary(&DailySummary {
            date: chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            total_scored: 0,
            failed: 0,
            low: 0,
            medium: 0,
            high: 0,
            alerts_sent: 0,
            alerts_suppressed: 0,
            drift: None,
            lifecycle: "retrain skipped".to_string(),
        }));
    }
}
