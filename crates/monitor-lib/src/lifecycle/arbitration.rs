//! Head-to-head arbitration between incumbent and candidate
//!
//! The candidate wins only if it beats the incumbent by the margin on
//! BOTH accuracy and F1. Anything else, including an internal failure
//! while measuring, keeps the incumbent.

use crate::ml::ClassificationMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum improvement required on each metric
pub const PROMOTION_MARGIN: f64 = 0.02;

/// Metric gains are compared with this slack so that a gain of exactly the
/// margin (0.70 - 0.68) is not lost to binary rounding
const MARGIN_TOLERANCE: f64 = 1e-9;

/// Which artifact should be active after arbitration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Candidate,
    Incumbent,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Candidate => write!(f, "candidate"),
            Verdict::Incumbent => write!(f, "incumbent"),
        }
    }
}

/// Conjunctive margin test
pub fn decide(
    incumbent: &ClassificationMetrics,
    candidate: &ClassificationMetrics,
    margin: f64,
) -> Verdict {
    let clears = |gain: f64| gain > margin - MARGIN_TOLERANCE;
    let accuracy_wins = clears(candidate.accuracy - incumbent.accuracy);
    let f1_wins = clears(candidate.f1 - incumbent.f1);
    if accuracy_wins && f1_wins {
        Verdict::Candidate
    } else {
        Verdict::Incumbent
    }
}

/// Outcome of one arbitration, with the measurements behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationReport {
    pub verdict: Verdict,
    pub incumbent: Option<ClassificationMetrics>,
    pub candidate: Option<ClassificationMetrics>,
    pub margin: f64,
    /// Set when the verdict was forced by an internal failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl ArbitrationReport {
    pub(crate) fn measured(
        incumbent: ClassificationMetrics,
        candidate: ClassificationMetrics,
        margin: f64,
    ) -> Self {
        Self {
            verdict: decide(&incumbent, &candidate, margin),
            incumbent: Some(incumbent),
            candidate: Some(candidate),
            margin,
            fallback_reason: None,
        }
    }

    pub(crate) fn fallback(reason: impl Into<String>, margin: f64) -> Self {
        Self {
            verdict: Verdict::Incumbent,
            incumbent: None,
            candidate: None,
            margin,
            fallback_reason: Some(reason.into()),
        }
    }

    pub fn promotes(&self) -> bool {
        self.verdict == Verdict::Candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(accuracy: f64, f1: f64) -> ClassificationMetrics {
        ClassificationMetrics {
            accuracy,
            f1,
            samples: 100,
        }
    }

    #[test]
    fn test_both_margins_met_promotes() {
        let verdict = decide(&metrics(0.77, 0.68), &metrics(0.80, 0.70), PROMOTION_MARGIN);
        assert_eq!(verdict, Verdict::Candidate);
    }

    #[test]
    fn test_gain_below_margin_rejects() {
        let verdict = decide(&metrics(0.77, 0.68), &metrics(0.80, 0.695), PROMOTION_MARGIN);
        assert_eq!(verdict, Verdict::Incumbent);
    }

    #[test]
    fn test_equal_f1_rejects() {
        let verdict = decide(&metrics(0.77, 0.68), &metrics(0.80, 0.68), PROMOTION_MARGIN);
        assert_eq!(verdict, Verdict::Incumbent);
    }

    #[test]
    fn test_trading_one_metric_for_another_rejects() {
        let verdict = decide(&metrics(0.77, 0.68), &metrics(0.70, 0.90), PROMOTION_MARGIN);
        assert_eq!(verdict, Verdict::Incumbent);
        let verdict = decide(&metrics(0.77, 0.68), &metrics(0.95, 0.60), PROMOTION_MARGIN);
        assert_eq!(verdict, Verdict::Incumbent);
    }

    #[test]
    fn test_fallback_report_keeps_incumbent() {
        let report = ArbitrationReport::fallback("incumbent failed to score", PROMOTION_MARGIN);
        assert!(!report.promotes());
        assert_eq!(report.verdict.to_string(), "incumbent");
    }
}
