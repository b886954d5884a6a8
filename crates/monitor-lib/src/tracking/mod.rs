//! Performance tracking and drift detection
//!
//! This module provides:
//! - Accuracy/F1 measurement of an artifact against labeled records
//! - The append-only snapshot history and its single-step drift rule

mod tracker;

pub use tracker::{
    measure_artifact, DriftReport, PerformanceTracker, TrackerConfig, DEFAULT_DRIFT_THRESHOLD,
};
