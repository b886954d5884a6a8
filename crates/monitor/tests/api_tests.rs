//! Integration tests for the monitor API endpoints

#[path = "../src/api.rs"]
#[allow(dead_code)]
mod api;

use api::{create_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use monitor_lib::{
    artifact::{train_initial, ArtifactSlot, FeatureSchema, TrainingConfig},
    health::{components, HealthRegistry},
    models::StudentRecord,
    observability::MonitorMetrics,
    synthetic,
};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app(slot: ArtifactSlot) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SCHEDULER).await;
    health_registry.register(components::PREDICTOR).await;

    let state = Arc::new(AppState::new(health_registry, slot));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn trained_slot() -> ArtifactSlot {
    let records: Vec<_> = synthetic::generate(150, 11)
        .iter()
        .map(StudentRecord::to_raw)
        .collect();
    let trained = train_initial(
        &records,
        "is_active",
        &FeatureSchema::student_default(),
        &TrainingConfig::default(),
    )
    .unwrap();
    ArtifactSlot::with_artifact(trained.artifact)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app(ArtifactSlot::new()).await;

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["components"]["scheduler"]["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app(ArtifactSlot::new()).await;

    state
        .health_registry
        .set_degraded(components::PREDICTOR, "3 of 100 records failed to score")
        .await;

    // Degraded still returns 200 (operational)
    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["predictor"]["message"],
        "3 of 100 records failed to score"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app(ArtifactSlot::new()).await;

    state
        .health_registry
        .set_unhealthy(components::PREDICTOR, "No model artifact loaded")
        .await;

    let (status, health) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app(ArtifactSlot::new()).await;

    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app(ArtifactSlot::new()).await;
    state.health_registry.set_ready(true).await;

    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app(ArtifactSlot::new()).await;
    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::SCHEDULER, "Failed")
        .await;

    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(readiness["reason"].as_str().unwrap().contains("scheduler"));
}

#[tokio::test]
async fn test_model_returns_404_without_artifact() {
    let (app, _state) = setup_test_app(ArtifactSlot::new()).await;

    let (status, _) = get(app, "/model").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_model_describes_active_artifact() {
    let (app, _state) = setup_test_app(trained_slot()).await;

    let (status, info) = get_json(app, "/model").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["version"], "v1");
    assert!(info.get("retrained_at").is_none());
    let features: Vec<_> = info["feature_names"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f.as_str().unwrap().to_string())
        .collect();
    assert_eq!(features, FeatureSchema::student_default().features);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app(ArtifactSlot::new()).await;

    let metrics = MonitorMetrics::new();
    metrics.observe_batch(0.12, 40, 2);
    metrics.set_model_version("v3");

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("risk_monitor_records_scored_total"));
    assert!(text.contains("risk_monitor_scoring_latency_seconds"));
    assert!(text.contains("risk_monitor_model_version_info{version=\"v3\"}"));
}
