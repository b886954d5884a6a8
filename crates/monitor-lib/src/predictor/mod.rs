//! Dropout risk scoring

mod features;
mod inference;
mod output;

pub use features::{verify_layout, FeatureCodec, FeatureContract, MISSING_FEATURE_DEFAULT};
pub use inference::{score_artifact, InferenceStats, Predictor, Scored};
pub use output::{
    ResultFormatter, RiskThresholds, HIGH_RISK_THRESHOLD, MEDIUM_RISK_THRESHOLD,
};
