//! Integration tests for the advisor API endpoints

use advisor_lib::{
    health::{components, HealthRegistry},
    AdvisorEngine, EngineConfig, SimulatedProvider, SystemClock,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use workstation_advisor::api::{create_router, AppState};

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register_engine_components().await;

    let engine = AdvisorEngine::new(
        EngineConfig::default(),
        Arc::new(SimulatedProvider::default()),
        Arc::new(SystemClock),
    )
    .unwrap();
    let state = Arc::new(AppState::new(Arc::new(engine), health_registry));
    let router = create_router(state.clone());

    (router, state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register(app: &Router, name: &str, instance_type: &str) {
    let (status, _) = send(
        app,
        "POST",
        "/api/v1/instances",
        Some(json!({
            "name": name,
            "instance_type": instance_type,
            "launched_at": (Utc::now() - ChronoDuration::days(3)).to_rfc3339(),
            "initial_state": "running",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

fn samples(count: i64, cpu: f64, memory: f64) -> Value {
    let start = Utc::now() - ChronoDuration::hours(3);
    let batch: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "timestamp": (start + ChronoDuration::minutes(2 * i)).to_rfc3339(),
                "cpu_percent": cpu,
                "memory_percent": memory,
                "disk_percent": 30.0,
                "network_bytes_per_sec": 20000.0,
            })
        })
        .collect();
    Value::Array(batch)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = send(&app, "GET", "/healthz", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::RECOMMENDER, "Every refresh failed")
        .await;

    let (status, health) = send(&app, "GET", "/healthz", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_ready_flag() {
    let (app, state) = setup_test_app().await;

    let (status, _) = send(&app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.health_registry.set_ready(true).await;
    let (status, readiness) = send(&app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_engine_metrics() {
    let (app, _state) = setup_test_app().await;
    register(&app, "ws-metrics", "t3.medium").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("workstation_advisor_instances_monitored"));
}

#[tokio::test]
async fn test_register_and_fetch_instance() {
    let (app, _state) = setup_test_app().await;
    register(&app, "ws-1", "t4g.large").await;

    let (status, snapshot) = send(&app, "GET", "/api/v1/instances/ws-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["tier"], "L");
    assert_eq!(snapshot["state"], "running");

    let (status, list) = send(&app, "GET", "/api/v1/instances", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let (app, _state) = setup_test_app().await;
    register(&app, "ws-1", "t4g.large").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/instances",
        Some(json!({ "name": "ws-1", "instance_type": "t4g.small" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "instance_exists");
}

#[tokio::test]
async fn test_unknown_instance_is_404() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = send(&app, "GET", "/api/v1/instances/ghost/recommendation", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_instance");
}

#[tokio::test]
async fn test_insufficient_metrics_is_503_with_retry_hint() {
    let (app, _state) = setup_test_app().await;
    register(&app, "ws-1", "t4g.medium").await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/instances/ws-1/metrics",
        Some(samples(5, 50.0, 50.0)),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/instances/ws-1/recommendation")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key("retry-after"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "insufficient_metrics");
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn test_batch_ingest_reports_out_of_order_samples() {
    let (app, _state) = setup_test_app().await;
    register(&app, "ws-1", "t4g.medium").await;

    let mut batch = samples(3, 40.0, 40.0);
    let first = batch[0].clone();
    batch.as_array_mut().unwrap().push(first.clone());

    let (status, report) = send(&app, "POST", "/api/v1/instances/ws-1/metrics", Some(batch)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(report["accepted"], 3);
    assert_eq!(report["rejected"].as_array().unwrap().len(), 1);

    // A lone out-of-order sample is rejected outright
    let (status, body) = send(&app, "POST", "/api/v1/instances/ws-1/metrics", Some(first)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "out_of_order_sample");
}

#[tokio::test]
async fn test_out_of_range_samples_are_rejected() {
    let (app, _state) = setup_test_app().await;
    register(&app, "ws-1", "t4g.medium").await;

    let mut sample = samples(1, 40.0, 40.0)[0].clone();
    sample["cpu_percent"] = json!(500.0);
    let (status, body) = send(&app, "POST", "/api/v1/instances/ws-1/metrics", Some(sample)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_input");

    let mut batch = samples(3, 40.0, 40.0);
    batch[1]["network_bytes_per_sec"] = json!(-5.0);
    let (status, report) = send(&app, "POST", "/api/v1/instances/ws-1/metrics", Some(batch)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(report["accepted"], 2);
    assert_eq!(report["rejected"].as_array().unwrap().len(), 1);

    let (_, summary) = send(&app, "GET", "/api/v1/instances/ws-1/utilization", None).await;
    assert_eq!(summary["sample_count"], 2);
}

#[tokio::test]
async fn test_recommendation_and_fleet_listing() {
    let (app, _state) = setup_test_app().await;
    register(&app, "ws-idle", "t4g.large").await;
    register(&app, "ws-new", "t4g.small").await;
    send(
        &app,
        "POST",
        "/api/v1/instances/ws-idle/metrics",
        Some(samples(40, 6.0, 12.0)),
    )
    .await;

    let (status, rec) = send(&app, "GET", "/api/v1/instances/ws-idle/recommendation", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rec["recommendation_type"], "downsize");
    assert_eq!(rec["recommended_tier"], "M");

    let (status, summary) = send(&app, "GET", "/api/v1/instances/ws-idle/utilization", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["sample_count"], 40);

    let (status, fleet) = send(&app, "GET", "/api/v1/recommendations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fleet["recommendations"].as_array().unwrap().len(), 1);
    assert_eq!(fleet["skipped"][0]["instance_name"], "ws-new");
    assert_eq!(fleet["summary"]["downsize"], 1);
}

#[tokio::test]
async fn test_transition_and_invalid_transition() {
    let (app, _state) = setup_test_app().await;
    register(&app, "ws-1", "t3.medium").await;

    let (status, outcome) = send(
        &app,
        "POST",
        "/api/v1/instances/ws-1/transition",
        Some(json!({ "action": "hibernate" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["new_state"], "hibernated");
    assert_eq!(outcome["fallback_applied"], false);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/instances/ws-1/transition",
        Some(json!({ "action": "stop" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state_error");
}

#[tokio::test]
async fn test_hibernate_falls_back_to_stop_without_capability() {
    let (app, _state) = setup_test_app().await;
    register(&app, "ws-arm", "t4g.medium").await;

    let (status, outcome) = send(
        &app,
        "POST",
        "/api/v1/instances/ws-arm/transition",
        Some(json!({ "action": "hibernate" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["performed"], "stop");
    assert_eq!(outcome["new_state"], "stopped");
    assert_eq!(outcome["fallback_applied"], true);
}

#[tokio::test]
async fn test_policy_assignment_by_template_and_inline() {
    let (app, _state) = setup_test_app().await;
    register(&app, "ws-1", "t3.medium").await;

    let (status, templates) = send(&app, "GET", "/api/v1/policies", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!templates.as_array().unwrap().is_empty());

    let (status, policy) = send(
        &app,
        "PUT",
        "/api/v1/instances/ws-1/policy",
        Some(json!({ "template": "balanced" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(policy["idle_minutes"], 30);

    let (status, policy) = send(
        &app,
        "PUT",
        "/api/v1/instances/ws-1/policy",
        Some(json!({
            "name": "night-shift",
            "idle_minutes": 90,
            "action": "stop",
            "check_interval_minutes": 10,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(policy["name"], "night-shift");

    let (_, snapshot) = send(&app, "GET", "/api/v1/instances/ws-1", None).await;
    assert_eq!(snapshot["idle_policy"]["name"], "night-shift");

    // Registered three days ago, so mark it active before evaluating
    let (status, _) = send(&app, "POST", "/api/v1/instances/ws-1/activity", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, decision) = send(&app, "POST", "/api/v1/instances/ws-1/idle/evaluate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decision["decision"], "active");

    let (status, removal) = send(&app, "DELETE", "/api/v1/instances/ws-1/policy", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removal["removed"]["name"], "night-shift");

    let (status, body) = send(&app, "POST", "/api/v1/instances/ws-1/idle/evaluate", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_policy");
}

#[tokio::test]
async fn test_unknown_template_and_invalid_policy() {
    let (app, _state) = setup_test_app().await;
    register(&app, "ws-1", "t3.medium").await;

    let (status, _) = send(
        &app,
        "PUT",
        "/api/v1/instances/ws-1/policy",
        Some(json!({ "template": "does-not-exist" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/v1/instances/ws-1/policy",
        Some(json!({
            "name": "broken",
            "idle_minutes": 0,
            "action": "hibernate",
            "check_interval_minutes": 5,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_policy");
}

#[tokio::test]
async fn test_activity_and_deregister() {
    let (app, _state) = setup_test_app().await;
    register(&app, "ws-1", "t3.medium").await;

    let at = Utc::now() + ChronoDuration::minutes(1);
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/instances/ws-1/activity",
        Some(json!({ "at": at.to_rfc3339() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["instance_name"], "ws-1");

    let (status, history) = send(&app, "GET", "/api/v1/idle/history?instance=ws-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(history.as_array().unwrap().is_empty());

    let (status, _) = send(&app, "DELETE", "/api/v1/instances/ws-1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", "/api/v1/instances/ws-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
