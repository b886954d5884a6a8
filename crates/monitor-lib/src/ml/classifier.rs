//! Binary classifiers backing the model artifact
//!
//! Two families are supported: L2-regularised logistic regression and
//! gradient-boosted decision stumps on log-loss. Both are deterministic
//! for a given training set.

use super::sigmoid;
use crate::error::{LifecycleError, LifecycleResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Default number of boosting rounds
pub const DEFAULT_N_ESTIMATORS: usize = 100;

/// Leaf values are clamped to this magnitude to keep Newton steps bounded
const MAX_LEAF_VALUE: f64 = 10.0;

/// Hyper-parameters for training a fresh classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ClassifierSpec {
    Logistic {
        epochs: usize,
        learning_rate: f64,
        l2: f64,
    },
    GradientBoosting {
        n_estimators: usize,
        learning_rate: f64,
    },
}

impl Default for ClassifierSpec {
    fn default() -> Self {
        Self::gradient_boosting()
    }
}

impl ClassifierSpec {
    pub fn logistic() -> Self {
        ClassifierSpec::Logistic {
            epochs: 500,
            learning_rate: 0.1,
            l2: 1e-3,
        }
    }

    pub fn gradient_boosting() -> Self {
        ClassifierSpec::GradientBoosting {
            n_estimators: DEFAULT_N_ESTIMATORS,
            learning_rate: 0.1,
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            ClassifierSpec::Logistic { .. } => "logistic",
            ClassifierSpec::GradientBoosting { .. } => "gradient_boosting",
        }
    }

    /// Train a new classifier instance on scaled rows
    pub fn fit(&self, rows: &[Vec<f64>], labels: &[u8]) -> LifecycleResult<Classifier> {
        validate_training_set(rows, labels)?;
        let model = match *self {
            ClassifierSpec::Logistic {
                epochs,
                learning_rate,
                l2,
            } => Classifier::Logistic(LogisticRegression::fit(
                rows,
                labels,
                epochs,
                learning_rate,
                l2,
            )),
            ClassifierSpec::GradientBoosting {
                n_estimators,
                learning_rate,
            } => Classifier::GradientBoosting(GradientBoostedStumps::fit(
                rows,
                labels,
                n_estimators,
                learning_rate,
            )),
        };
        Ok(model)
    }
}

fn validate_training_set(rows: &[Vec<f64>], labels: &[u8]) -> LifecycleResult<()> {
    if rows.is_empty() {
        return Err(LifecycleError::InsufficientData(
            "cannot train on zero rows".to_string(),
        ));
    }
    if rows.len() != labels.len() {
        return Err(LifecycleError::InvalidInput(format!(
            "{} rows but {} labels",
            rows.len(),
            labels.len()
        )));
    }
    let positives = labels.iter().filter(|&&y| y == 1).count();
    if positives == 0 || positives == labels.len() {
        return Err(LifecycleError::InsufficientData(
            "training labels contain a single class".to_string(),
        ));
    }
    Ok(())
}

/// A trained binary classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Classifier {
    Logistic(LogisticRegression),
    GradientBoosting(GradientBoostedStumps),
}

impl Classifier {
    /// Hyper-parameters that produced this model
    pub fn spec(&self) -> ClassifierSpec {
        match self {
            Classifier::Logistic(m) => ClassifierSpec::Logistic {
                epochs: m.epochs,
                learning_rate: m.learning_rate,
                l2: m.l2,
            },
            Classifier::GradientBoosting(m) => ClassifierSpec::GradientBoosting {
                n_estimators: m.n_estimators,
                learning_rate: m.learning_rate,
            },
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Classifier::Logistic(m) => m.weights.len(),
            Classifier::GradientBoosting(m) => m.width,
        }
    }

    /// Probability that the label is 1
    pub fn predict_proba(&self, x: &[f64]) -> LifecycleResult<f64> {
        if x.len() != self.width() {
            return Err(LifecycleError::schema(
                "<vector>",
                format!("model expects {} features, got {}", self.width(), x.len()),
            ));
        }
        let p = match self {
            Classifier::Logistic(m) => m.probability(x),
            Classifier::GradientBoosting(m) => m.probability(x),
        };
        Ok(p)
    }

    /// Predicted label at the 0.5 decision boundary
    pub fn predict(&self, x: &[f64]) -> LifecycleResult<u8> {
        Ok(if self.predict_proba(x)? >= 0.5 { 1 } else { 0 })
    }
}

/// Logistic regression trained with full-batch gradient descent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub weights: Vec<f64>,
    pub bias: f64,
    epochs: usize,
    learning_rate: f64,
    l2: f64,
}

impl LogisticRegression {
    fn fit(rows: &[Vec<f64>], labels: &[u8], epochs: usize, learning_rate: f64, l2: f64) -> Self {
        let width = rows[0].len();
        let n = rows.len() as f64;
        let mut weights = vec![0.0; width];
        let mut bias = 0.0;

        for _ in 0..epochs {
            let mut grad_w = vec![0.0; width];
            let mut grad_b = 0.0;
            for (row, &y) in rows.iter().zip(labels) {
                let z = bias + dot(&weights, row);
                let err = sigmoid(z) - y as f64;
                for (g, v) in grad_w.iter_mut().zip(row) {
                    *g += err * v;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= learning_rate * (g / n + l2 * *w);
            }
            bias -= learning_rate * grad_b / n;
        }

        Self {
            weights,
            bias,
            epochs,
            learning_rate,
            l2,
        }
    }

    fn probability(&self, x: &[f64]) -> f64 {
        sigmoid(self.bias + dot(&self.weights, x))
    }
}

/// Single-split regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    pub feature: usize,
    pub threshold: f64,
    pub left: f64,
    pub right: f64,
}

impl Stump {
    fn predict(&self, x: &[f64]) -> f64 {
        if x[self.feature] <= self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

/// Gradient boosting over decision stumps with log-loss and Newton leaf values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedStumps {
    pub init: f64,
    pub stumps: Vec<Stump>,
    width: usize,
    n_estimators: usize,
    learning_rate: f64,
}

impl GradientBoostedStumps {
    fn fit(rows: &[Vec<f64>], labels: &[u8], n_estimators: usize, learning_rate: f64) -> Self {
        let n = rows.len();
        let width = rows[0].len();
        let positives = labels.iter().filter(|&&y| y == 1).count() as f64;
        let prior = (positives / n as f64).clamp(1e-6, 1.0 - 1e-6);
        let init = (prior / (1.0 - prior)).ln();

        // Row order per feature, computed once
        let orders: Vec<Vec<usize>> = (0..width)
            .map(|j| {
                let mut idx: Vec<usize> = (0..n).collect();
                idx.sort_by(|&a, &b| {
                    rows[a][j]
                        .partial_cmp(&rows[b][j])
                        .unwrap_or(Ordering::Equal)
                });
                idx
            })
            .collect();

        let mut raw = vec![init; n];
        let mut stumps = Vec::with_capacity(n_estimators);

        for _ in 0..n_estimators {
            let probs: Vec<f64> = raw.iter().map(|&z| sigmoid(z)).collect();
            let residuals: Vec<f64> = labels
                .iter()
                .zip(&probs)
                .map(|(&y, p)| y as f64 - p)
                .collect();
            let hessians: Vec<f64> = probs.iter().map(|p| p * (1.0 - p)).collect();

            let stump = match best_stump(rows, &orders, &residuals, &hessians) {
                Some(s) => s,
                None => break,
            };
            for (z, row) in raw.iter_mut().zip(rows) {
                *z += learning_rate * stump.predict(row);
            }
            stumps.push(stump);
        }

        Self {
            init,
            stumps,
            width,
            n_estimators,
            learning_rate,
        }
    }

    fn probability(&self, x: &[f64]) -> f64 {
        let boost: f64 = self.stumps.iter().map(|s| s.predict(x)).sum();
        sigmoid(self.init + self.learning_rate * boost)
    }
}

/// Find the split maximising the squared-residual gain, then fit Newton leaves
fn best_stump(
    rows: &[Vec<f64>],
    orders: &[Vec<usize>],
    residuals: &[f64],
    hessians: &[f64],
) -> Option<Stump> {
    let n = rows.len();
    let total: f64 = residuals.iter().sum();
    let mut best: Option<(f64, usize, f64)> = None;

    for (j, order) in orders.iter().enumerate() {
        let mut left_sum = 0.0;
        for k in 0..n - 1 {
            let i = order[k];
            left_sum += residuals[i];
            let here = rows[i][j];
            let next = rows[order[k + 1]][j];
            if next <= here {
                continue;
            }
            let left_n = (k + 1) as f64;
            let right_n = (n - k - 1) as f64;
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / left_n + right_sum * right_sum / right_n;
            if best.map_or(true, |(g, _, _)| gain > g) {
                best = Some((gain, j, (here + next) / 2.0));
            }
        }
    }

    let (_, feature, threshold) = best?;
    let (mut lr, mut lh, mut rr, mut rh) = (0.0, 0.0, 0.0, 0.0);
    for (i, row) in rows.iter().enumerate() {
        if row[feature] <= threshold {
            lr += residuals[i];
            lh += hessians[i];
        } else {
            rr += residuals[i];
            rh += hessians[i];
        }
    }
    Some(Stump {
        feature,
        threshold,
        left: newton_leaf(lr, lh),
        right: newton_leaf(rr, rh),
    })
}

fn newton_leaf(residual_sum: f64, hessian_sum: f64) -> f64 {
    (residual_sum / hessian_sum.max(1e-12)).clamp(-MAX_LEAF_VALUE, MAX_LEAF_VALUE)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
