//! Numeric building blocks of a model artifact
//!
//! Everything an artifact bundles besides its feature order:
//! - Label encoders for categorical columns
//! - Feature scalers
//! - Binary classifiers
//! - Classification metrics and stratified splitting

mod classifier;
mod encoder;
mod metrics;
mod scaler;
mod split;

pub use classifier::{
    Classifier, ClassifierSpec, GradientBoostedStumps, LogisticRegression, Stump,
};
pub use encoder::LabelEncoder;
pub use metrics::ClassificationMetrics;
pub use scaler::{Scaler, ScalerKind};
pub use split::{stratified_split, SplitIndices};

/// Logistic function
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
