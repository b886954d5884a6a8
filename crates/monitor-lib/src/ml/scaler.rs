//! Feature scaling fitted on training rows only

use crate::error::{LifecycleError, LifecycleResult};
use serde::{Deserialize, Serialize};

/// Scaling algorithm family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerKind {
    Standard,
    MinMax,
}

/// A fitted numeric normalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    /// Zero mean, unit variance (population std; zero std treated as 1)
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// Maps each column to [0, 1] over the fitted range (zero range treated as 1)
    MinMax { min: Vec<f64>, range: Vec<f64> },
}

impl Scaler {
    /// Fit a fresh scaler of `kind` on `rows`
    pub fn fit(kind: ScalerKind, rows: &[Vec<f64>]) -> LifecycleResult<Self> {
        let width = match rows.first() {
            Some(r) => r.len(),
            None => {
                return Err(LifecycleError::InsufficientData(
                    "cannot fit a scaler on zero rows".to_string(),
                ))
            }
        };
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(LifecycleError::schema(
                "<row>",
                format!("ragged rows: expected width {}, got {}", width, bad.len()),
            ));
        }
        let n = rows.len() as f64;

        match kind {
            ScalerKind::Standard => {
                let mut mean = vec![0.0; width];
                for row in rows {
                    for (m, v) in mean.iter_mut().zip(row) {
                        *m += v;
                    }
                }
                mean.iter_mut().for_each(|m| *m /= n);

                let mut scale = vec![0.0; width];
                for row in rows {
                    for ((s, v), m) in scale.iter_mut().zip(row).zip(&mean) {
                        *s += (v - m).powi(2);
                    }
                }
                let scale = scale
                    .into_iter()
                    .map(|s| {
                        let std = (s / n).sqrt();
                        if std < f64::EPSILON {
                            1.0
                        } else {
                            std
                        }
                    })
                    .collect();
                Ok(Scaler::Standard { mean, scale })
            }
            ScalerKind::MinMax => {
                let mut min = vec![f64::INFINITY; width];
                let mut max = vec![f64::NEG_INFINITY; width];
                for row in rows {
                    for (i, v) in row.iter().enumerate() {
                        min[i] = min[i].min(*v);
                        max[i] = max[i].max(*v);
                    }
                }
                let range = min
                    .iter()
                    .zip(&max)
                    .map(|(lo, hi)| {
                        let r = hi - lo;
                        if r < f64::EPSILON {
                            1.0
                        } else {
                            r
                        }
                    })
                    .collect();
                Ok(Scaler::MinMax { min, range })
            }
        }
    }

    pub fn kind(&self) -> ScalerKind {
        match self {
            Scaler::Standard { .. } => ScalerKind::Standard,
            Scaler::MinMax { .. } => ScalerKind::MinMax,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Scaler::Standard { mean, .. } => mean.len(),
            Scaler::MinMax { min, .. } => min.len(),
        }
    }

    pub fn transform(&self, row: &[f64]) -> LifecycleResult<Vec<f64>> {
        if row.len() != self.width() {
            return Err(LifecycleError::schema(
                "<vector>",
                format!(
                    "scaler fitted on {} features, got {}",
                    self.width(),
                    row.len()
                ),
            ));
        }
        let out = match self {
            Scaler::Standard { mean, scale } => row
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(v, (m, s))| (v - m) / s)
                .collect(),
            Scaler::MinMax { min, range } => row
                .iter()
                .zip(min.iter().zip(range))
                .map(|(v, (lo, r))| (v - lo) / r)
                .collect(),
        };
        Ok(out)
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> LifecycleResult<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}
