//! Recurring monitor loop
//!
//! This module provides:
//! - A cooperative scheduler with daily and fixed-period cadences
//! - The daily prediction job composing score, evaluate, retrain and alert
//! - The hourly data-quality job

mod jobs;
mod scheduler;


pub use jobs::{DailyJobConfig, DailyPredictionJob, DailyReport, DataQualityJob, JobFailure};
pub use scheduler::{
    Cadence, ComponentIssue, Scheduler, SchedulerConfig, Task, TaskReport, TaskRun,
};
