//! HTTP API for the advisor engine, health checks and Prometheus metrics

use advisor_lib::{
    health::{ComponentStatus, HealthRegistry},
    idle::{IdleDecision, IdleEvent, IdlePolicy},
    AdvisorEngine, EngineError, InstanceRegistration, InstanceSnapshot, LifecycleAction,
    MetricSample,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Seconds a client should wait before retrying an insufficient-metrics request
const INSUFFICIENT_METRICS_RETRY_SECS: u64 = 300;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AdvisorEngine>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(engine: Arc<AdvisorEngine>, health_registry: HealthRegistry) -> Self {
        Self {
            engine,
            health_registry,
        }
    }
}

/// Engine error rendered as a JSON response
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::UnknownInstance(_) | EngineError::UnknownPolicy(_) => StatusCode::NOT_FOUND,
        EngineError::State { .. }
        | EngineError::TransitionInProgress { .. }
        | EngineError::InstanceExists(_) => StatusCode::CONFLICT,
        EngineError::InvalidInput(_)
        | EngineError::InvalidPolicy(_)
        | EngineError::OutOfOrderSample { .. }
        | EngineError::UnknownInstanceType(_)
        | EngineError::UnknownTier(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::InsufficientMetrics { .. } => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Provider { .. } => StatusCode::BAD_GATEWAY,
        EngineError::ProviderTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        EngineError::Boundary { .. }
        | EngineError::CapabilityUnavailable { .. }
        | EngineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(error = %self.0, code = self.0.code(), "Request failed");
        }

        let retry_after_secs = match self.0 {
            EngineError::InsufficientMetrics { .. } => Some(INSUFFICIENT_METRICS_RETRY_SECS),
            _ => None,
        };
        let body = ErrorBody {
            error: self.0.code().to_string(),
            message: self.0.to_string(),
            retryable: self.0.is_retryable(),
            retry_after_secs,
        };

        match retry_after_secs {
            Some(secs) => (
                status,
                [(header::RETRY_AFTER, secs.to_string())],
                Json(body),
            )
                .into_response(),
            None => (status, Json(body)).into_response(),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---- instances ----

async fn register_instance(
    State(state): State<Arc<AppState>>,
    Json(registration): Json<InstanceRegistration>,
) -> ApiResult<(StatusCode, Json<InstanceSnapshot>)> {
    let snapshot = state.engine.register_instance(registration).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn list_instances(State(state): State<Arc<AppState>>) -> Json<Vec<InstanceSnapshot>> {
    Json(state.engine.list_instances().await)
}

async fn get_instance(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<InstanceSnapshot>> {
    Ok(Json(state.engine.instance(&name).await?))
}

async fn deregister_instance(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.deregister_instance(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- telemetry ----

/// One sample or a batch
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MetricsPayload {
    Batch(Vec<MetricSample>),
    Single(MetricSample),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RejectedSample {
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: Vec<RejectedSample>,
}

/// A single out-of-order or out-of-range sample is an error; in a batch it is
/// reported and the rest of the batch still lands.
async fn record_metrics(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(payload): Json<MetricsPayload>,
) -> ApiResult<(StatusCode, Json<IngestReport>)> {
    let samples = match payload {
        MetricsPayload::Single(sample) => {
            state.engine.record_sample(&name, sample)?;
            return Ok((
                StatusCode::ACCEPTED,
                Json(IngestReport {
                    accepted: 1,
                    rejected: Vec::new(),
                }),
            ));
        }
        MetricsPayload::Batch(samples) => samples,
    };

    let mut report = IngestReport {
        accepted: 0,
        rejected: Vec::new(),
    };
    for sample in samples {
        let timestamp = sample.timestamp;
        match state.engine.record_sample(&name, sample) {
            Ok(()) => report.accepted += 1,
            Err(e @ (EngineError::OutOfOrderSample { .. } | EngineError::InvalidInput(_))) => {
                report.rejected.push(RejectedSample {
                    timestamp,
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok((StatusCode::ACCEPTED, Json(report)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityRequest {
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub instance_name: String,
    pub last_active_at: DateTime<Utc>,
}

async fn record_activity(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Option<Json<ActivityRequest>>,
) -> ApiResult<Json<ActivityResponse>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let last_active_at = state.engine.record_activity(&name, request.at)?;
    Ok(Json(ActivityResponse {
        instance_name: name,
        last_active_at,
    }))
}

// ---- analysis and recommendations ----

async fn utilization(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.get_utilization_summary(&name)?))
}

async fn recommendation(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.get_recommendation(&name).await?))
}

async fn fleet_recommendations(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.list_recommendations().await)
}

// ---- lifecycle ----

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub action: LifecycleAction,
}

async fn transition(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state
        .engine
        .request_transition(&name, request.action)
        .await?;
    Ok(Json(outcome))
}

// ---- idle policies ----

/// Either a named template or an inline policy
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PolicyRequest {
    Template { template: String },
    Inline(IdlePolicy),
}

async fn assign_policy(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<PolicyRequest>,
) -> ApiResult<Json<IdlePolicy>> {
    let policy = match request {
        PolicyRequest::Template { template } => IdlePolicy::template(&template)?,
        PolicyRequest::Inline(policy) => policy,
    };
    state.engine.assign_policy(&name, policy.clone()).await?;
    Ok(Json(policy))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyRemoval {
    pub removed: Option<IdlePolicy>,
}

async fn remove_policy(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<PolicyRemoval>> {
    let removed = state.engine.remove_policy(&name).await?;
    Ok(Json(PolicyRemoval { removed }))
}

async fn evaluate_idle(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<IdleDecision>> {
    Ok(Json(state.engine.evaluate_idle(&name).await?))
}

async fn policy_templates(State(state): State<Arc<AppState>>) -> Json<Vec<IdlePolicy>> {
    Json(state.engine.policy_templates())
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub instance: Option<String>,
}

async fn idle_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<IdleEvent>> {
    let events = match query.instance {
        Some(name) => state.engine.idle_history_for(&name),
        None => state.engine.idle_history(),
    };
    Json(events)
}

// ---- health and metrics ----

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
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

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route(
            "/api/v1/instances",
            post(register_instance).get(list_instances),
        )
        .route(
            "/api/v1/instances/:name",
            get(get_instance).delete(deregister_instance),
        )
        .route("/api/v1/instances/:name/metrics", post(record_metrics))
        .route("/api/v1/instances/:name/activity", post(record_activity))
        .route("/api/v1/instances/:name/utilization", get(utilization))
        .route("/api/v1/instances/:name/recommendation", get(recommendation))
        .route("/api/v1/instances/:name/transition", post(transition))
        .route(
            "/api/v1/instances/:name/policy",
            axum::routing::put(assign_policy).delete(remove_policy),
        )
        .route("/api/v1/instances/:name/idle/evaluate", post(evaluate_idle))
        .route("/api/v1/recommendations", get(fleet_recommendations))
        .route("/api/v1/policies", get(policy_templates))
        .route("/api/v1/idle/history", get(idle_history))
        .with_state(state)
}

/// Start the API server, returning once `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
