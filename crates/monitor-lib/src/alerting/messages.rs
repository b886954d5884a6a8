//! Alert message composition

use crate::models::{PredictionResult, RiskBand};
use crate::tracking::DriftReport;
use chrono::NaiveDate;
use std::fmt::Write;

pub const HIGH_RISK_SUBJECT: &str = "Student Dropout Risk Alert";
pub const SUMMARY_SUBJECT: &str = "Daily Dropout Prediction Summary";

const RECOMMENDED_ACTIONS: [&str; 5] = [
    "Contact student immediately",
    "Schedule counseling session",
    "Review academic support options",
    "Monitor attendance closely",
    "Consider financial assistance if needed",
];

/// Inputs of the daily summary sent to administrators
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_scored: usize,
    pub failed: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub alerts_sent: usize,
    pub alerts_suppressed: usize,
    pub drift: Option<DriftReport>,
    /// Lifecycle branch taken, e.g. `retrain skipped`
    pub lifecycle: String,
}

impl DailySummary {
    /// Count bands over a scored batch
    pub fn tally(&mut self, results: &[PredictionResult]) {
        for r in results {
            match r.risk_band {
                RiskBand::Low => self.low += 1,
                RiskBand::Medium => self.medium += 1,
                RiskBand::High => self.high += 1,
            }
        }
        self.total_scored += results.len();
    }

    fn share(&self, count: usize) -> f64 {
        if self.total_scored == 0 {
            0.0
        } else {
            count as f64 * 100.0 / self.total_scored as f64
        }
    }
}

/// Mentor-facing alert for one high-risk prediction
pub fn high_risk_message(result: &PredictionResult) -> String {
    let mut msg = String::new();
    let _ = writeln!(msg, "HIGH RISK STUDENT ALERT");
    let _ = writeln!(msg);
    let _ = writeln!(msg, "Student ID: {}", result.record_id);
    let _ = writeln!(msg, "Dropout Probability: {:.2}%", result.probability * 100.0);
    let _ = writeln!(
        msg,
        "Risk Level: {} ({})",
        result.risk_band,
        result.risk_band.colour()
    );
    let _ = writeln!(msg, "Model Version: {}", result.model_version);
    let _ = writeln!(msg, "Time: {}", result.timestamp.to_rfc3339());
    let _ = writeln!(msg);
    let _ = writeln!(msg, "Recommended Actions:");
    for (i, action) in RECOMMENDED_ACTIONS.iter().enumerate() {
        let _ = writeln!(msg, "{}. {}", i + 1, action);
    }
    msg.trim_end().to_string()
}

/// Administrator-facing daily summary
pub fn summary_message(summary: &DailySummary) -> String {
    let mut msg = String::new();
    let _ = writeln!(msg, "DAILY DROPOUT PREDICTION SUMMARY");
    let _ = writeln!(msg);
    let _ = writeln!(msg, "Date: {}", summary.date);
    let _ = writeln!(msg);
    let _ = writeln!(msg, "Statistics:");
    let _ = writeln!(msg, "- Students Scored: {}", summary.total_scored);
    let _ = writeln!(msg, "- Scoring Failures: {}", summary.failed);
    let _ = writeln!(
        msg,
        "- High Risk Alerts: {} sent, {} suppressed",
        summary.alerts_sent, summary.alerts_suppressed
    );
    let _ = writeln!(msg);
    let _ = writeln!(msg, "Risk Distribution:");
    for (band, count) in [
        (RiskBand::Low, summary.low),
        (RiskBand::Medium, summary.medium),
        (RiskBand::High, summary.high),
    ] {
        let _ = writeln!(
            msg,
            "- {} ({} Risk): {} ({:.1}%)",
            band.colour(),
            band,
            count,
            summary.share(count)
        );
    }
    let _ = writeln!(msg);
    match &summary.drift {
        Some(d) => {
            let _ = writeln!(
                msg,
                "Drift: {} (accuracy {:.3} -> {:.3}, threshold {:.2})",
                if d.drifting { "detected" } else { "none" },
                d.previous_accuracy,
                d.current_accuracy,
                d.threshold
            );
        }
        None => {
            let _ = writeln!(msg, "Drift: not evaluated");
        }
    }
    let _ = writeln!(msg, "Model Lifecycle: {}", summary.lifecycle);
    msg.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn result(band: RiskBand, probability: f64) -> PredictionResult {
        PredictionResult {
            record_id: "STU00042".to_string(),
            prediction: 0,
            probability,
            risk_band: band,
            model_version: "v2".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_high_risk_message_content() {
        let msg = high_risk_message(&result(RiskBand::High, 0.8234));
        assert!(msg.contains("Student ID: STU00042"));
        assert!(msg.contains("82.34%"));
        assert!(msg.contains("High (Red)"));
        assert!(msg.contains("2024-03-01T02:00:00+00:00"));
        assert!(msg.contains("1. Contact student immediately"));
    }

    #[test]
    fn test_summary_counts_and_branch() {
        let mut summary = DailySummary {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            total_scored: 0,
            failed: 1,
            low: 0,
            medium: 0,
            high: 0,
            alerts_sent: 1,
            alerts_suppressed: 0,
            drift: None,
            lifecycle: "retrain skipped".to_string(),
        };
        summary.tally(&[
            result(RiskBand::Low, 0.1),
            result(RiskBand::Low, 0.2),
            result(RiskBand::Medium, 0.5),
            result(RiskBand::High, 0.9),
        ]);
        let msg = summary_message(&summary);
        assert!(msg.contains("Students Scored: 4"));
        assert!(msg.contains("Green (Low Risk): 2 (50.0%)"));
        assert!(msg.contains("Red (High Risk): 1 (25.0%)"));
        assert!(msg.contains("Drift: not evaluated"));
        assert!(msg.contains("Model Lifecycle: retrain skipped"));
    }
}
