//! Model lifecycle management
//!
//! This module provides:
//! - Retraining with backup-before-write
//! - Conjunctive-margin arbitration between candidate and incumbent
//! - Guarded promotion and rollback of the active artifact

mod arbitration;
mod manager;


pub use arbitration::{decide, ArbitrationReport, Verdict, PROMOTION_MARGIN};
pub use manager::{
    default_backup_path, CycleOutcome, LifecycleConfig, LifecycleState, ModelLifecycleManager,
    TransitionGuard,
};
