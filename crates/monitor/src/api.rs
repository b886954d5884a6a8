//! HTTP API for health checks, model info and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use monitor_lib::{
    artifact::ArtifactSlot,
    health::{ComponentStatus, HealthRegistry},
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub slot: ArtifactSlot,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, slot: ArtifactSlot) -> Self {
        Self {
            health_registry,
            slot,
        }
    }
}

/// Summary of the active artifact
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrained_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holdout_accuracy: Option<f64>,
    pub classifier: String,
    pub feature_names: Vec<String>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Active model info - 404 when no artifact is loaded
async fn model(State(state): State<Arc<AppState>>) -> Response {
    match state.slot.current() {
        Some(artifact) => Json(ModelInfo {
            version: artifact.version().to_string(),
            trained_at: artifact.trained_at(),
            retrained_at: artifact.retrained_at(),
            holdout_accuracy: artifact.holdout_accuracy(),
            classifier: artifact.model().spec().family().to_string(),
            feature_names: artifact.feature_names().to_vec(),
        })
        .into_response(),
        None => (StatusCode::NOT_FOUND, "no model artifact loaded").into_response(),
    }
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/model", get(model))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
