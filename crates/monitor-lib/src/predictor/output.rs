//! Prediction output formatting and risk banding
//!
//! Maps a risk probability onto the three-tier Low/Medium/High scale and
//! assembles the `PredictionResult` handed to persistence and alerting.

use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{PredictionResult, RiskBand};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Probabilities at or above this are Medium (Amber)
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.3;

/// Probabilities at or above this are High (Red)
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

/// Band boundaries; `classify` uses `[0, medium_from)`, `[medium_from, high_from)`, `[high_from, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub medium_from: f64,
    pub high_from: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium_from: MEDIUM_RISK_THRESHOLD,
            high_from: HIGH_RISK_THRESHOLD,
        }
    }
}

impl RiskThresholds {
    pub fn new(medium_from: f64, high_from: f64) -> LifecycleResult<Self> {
        let valid = (0.0..=1.0).contains(&medium_from)
            && (0.0..=1.0).contains(&high_from)
            && medium_from <= high_from;
        if !valid {
            return Err(LifecycleError::InvalidInput(format!(
                "risk thresholds must satisfy 0 <= medium ({}) <= high ({}) <= 1",
                medium_from, high_from
            )));
        }
        Ok(Self {
            medium_from,
            high_from,
        })
    }

    pub fn classify(&self, probability: f64) -> RiskBand {
        if probability < self.medium_from {
            RiskBand::Low
        } else if probability < self.high_from {
            RiskBand::Medium
        } else {
            RiskBand::High
        }
    }
}

/// Builds prediction results from raw model output
#[derive(Debug, Clone, Default)]
pub struct ResultFormatter {
    thresholds: RiskThresholds,
}

impl ResultFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> RiskThresholds {
        self.thresholds
    }

    /// Format one scored record
    pub fn format(
        &self,
        record_id: &str,
        prediction: u8,
        probability: f64,
        model_version: &str,
        timestamp: DateTime<Utc>,
    ) -> PredictionResult {
        let probability = probability.clamp(0.0, 1.0);
        PredictionResult {
            record_id: record_id.to_string(),
            prediction,
            probability,
            risk_band: self.thresholds.classify(probability),
            model_version: model_version.to_string(),
            timestamp,
        }
    }
}
