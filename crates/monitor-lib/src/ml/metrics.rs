//! Classification metrics against ground truth

use serde::{Deserialize, Serialize};

/// Accuracy and F1 of binary predictions (positive label 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub f1: f64,
    pub samples: usize,
}

impl ClassificationMetrics {
    /// Compute metrics over paired labels. An empty input yields zeros.
    pub fn compute(truth: &[u8], predicted: &[u8]) -> Self {
        let samples = truth.len().min(predicted.len());
        if samples == 0 {
            return Self {
                accuracy: 0.0,
                f1: 0.0,
                samples: 0,
            };
        }

        let (mut tp, mut fp, mut fn_, mut hits) = (0usize, 0usize, 0usize, 0usize);
        for (&y, &p) in truth.iter().zip(predicted) {
            if y == p {
                hits += 1;
            }
            match (y, p) {
                (1, 1) => tp += 1,
                (0, 1) => fp += 1,
                (1, 0) => fn_ += 1,
                _ => {}
            }
        }

        // Zero-division convention: F1 is 0 when there are no positives at all
        let denom = 2 * tp + fp + fn_;
        let f1 = if denom == 0 {
            0.0
        } else {
            2.0 * tp as f64 / denom as f64
        };

        Self {
            accuracy: hits as f64 / samples as f64,
            f1,
            samples,
        }
    }
}
