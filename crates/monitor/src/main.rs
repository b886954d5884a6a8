//! Risk Monitor - recurring dropout risk scoring service
//!
//! Scores the student population on a daily schedule, watches for
//! accuracy drift against labeled outcomes, retrains and arbitrates on
//! drift, and alerts mentors about high-risk students.

use anyhow::{Context, Result};
use monitor_lib::{
    alerting::{AlertConfig, Alerter, LogAlertSink},
    artifact::{ArtifactSlot, FeatureSchema, FsArtifactStore},
    health::{components, HealthRegistry},
    lifecycle::{LifecycleConfig, ModelLifecycleManager},
    monitor::{Cadence, DailyJobConfig, DailyPredictionJob, DataQualityJob, Scheduler, SchedulerConfig},
    observability::{MonitorMetrics, StructuredLogger},
    predictor::Predictor,
    storage::JsonFileRecordStore,
    tracking::PerformanceTracker,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting risk-monitor");

    let config = config::MonitorConfig::load()?;
    info!(
        instance = %config.instance_name,
        artifact_path = %config.artifact_path.display(),
        records_path = %config.records_path.display(),
        "Monitor configured"
    );

    let health_registry = HealthRegistry::new();
    for name in components::ALL {
        health_registry.register(name).await;
    }

    let metrics = MonitorMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    // Active artifact
    let slot = ArtifactSlot::new();
    let lifecycle_config =
        LifecycleConfig::new(&config.artifact_path).with_backup_path(config.backup_path());
    let manager = Arc::new(ModelLifecycleManager::new(
        lifecycle_config,
        Arc::new(FsArtifactStore::new()),
        slot.clone(),
    ));
    let model_version = match manager.load_active() {
        Ok(artifact) => {
            metrics.set_model_version(artifact.version());
            Some(artifact.version().to_string())
        }
        Err(e) => {
            warn!(error = %e, "No active model loaded; scoring is disabled until one is trained");
            health_registry
                .set_unhealthy(components::ARTIFACT_STORE, e.to_string())
                .await;
            None
        }
    };
    logger.log_startup(MONITOR_VERSION, model_version.as_deref());

    // Collaborators
    let store = Arc::new(JsonFileRecordStore::new(
        &config.records_path,
        &config.predictions_path,
    ));
    let alerter = Arc::new(Alerter::new(
        AlertConfig {
            mentor_recipient: config.mentor_recipient.clone(),
            admin_recipient: config.admin_recipient.clone(),
            dedup_window: config.alert_dedup_window(),
        },
        Arc::new(LogAlertSink),
    ));
    let predictor = Arc::new(Predictor::new(slot.clone()));

    let required_columns = slot
        .current()
        .map(|a| a.feature_names().to_vec())
        .unwrap_or_else(|| FeatureSchema::student_default().features);

    // Recurring tasks
    let mut scheduler = Scheduler::new(SchedulerConfig {
        poll_interval: config.poll_interval(),
    })
    .with_health(health_registry.clone());
    scheduler.add(
        Box::new(DailyPredictionJob::new(
            DailyJobConfig {
                target_column: config.target_column.clone(),
                lookback: config.lookback(),
            },
            store.clone(),
            predictor,
            PerformanceTracker::default(),
            manager,
            alerter,
            metrics.clone(),
            logger.clone(),
        )),
        Cadence::daily_at(config.daily_run_hour, config.daily_run_minute)
            .context("invalid daily run time")?,
    );
    scheduler.add(
        Box::new(DataQualityJob::new(
            store,
            required_columns,
            metrics.clone(),
            logger.clone(),
        )),
        Cadence::every(config.quality_check_interval()).context("invalid quality check interval")?,
    );

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), slot));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Mark monitor as ready after initialization
    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    // The scheduler observes this between polls; a running task finishes first
    let _ = shutdown_tx.send(());
    if let Err(e) = scheduler_handle.await {
        warn!(error = %e, "Scheduler task ended abnormally");
    }
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
