//! Core library for the dropout risk monitor
//!
//! This crate provides the core functionality for:
//! - Feature encoding against a frozen artifact contract
//! - Batch scoring into three-tier risk bands
//! - Performance tracking and drift detection
//! - Retraining, arbitration, promotion and rollback of the active model
//! - The recurring monitor loop, alerting, health checks and observability

pub mod alerting;
pub mod artifact;
pub mod clock;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod ml;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod predictor;
pub mod storage;
pub mod synthetic;
pub mod tracking;

pub use artifact::{ArtifactSlot, ArtifactStore, FsArtifactStore, ModelArtifact};
pub use error::{LifecycleError, LifecycleResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use lifecycle::{CycleOutcome, LifecycleConfig, ModelLifecycleManager};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use predictor::Predictor;
pub use tracking::PerformanceTracker;
