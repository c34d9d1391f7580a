//! HTTP API: mission trigger, mission state, health checks and Prometheus metrics

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use edge_lib::{
    error::MissionError,
    health::{ComponentStatus, HealthRegistry},
    mission::{MissionController, MissionState},
    models::{MissionOutcome, MissionReason, MissionRequest},
    observability::{EdgeMetrics, StructuredLogger},
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: EdgeMetrics,
    pub logger: StructuredLogger,
    pub controller: Arc<MissionController>,
    /// Bearer token accepted by the trigger endpoint; `None` rejects all
    pub api_token: Option<String>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: EdgeMetrics,
        logger: StructuredLogger,
        controller: Arc<MissionController>,
        api_token: Option<String>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            logger,
            controller,
            api_token,
        }
    }
}

/// Optional body of `POST /start_mission`
#[derive(Debug, Default, Deserialize)]
pub struct StartMissionBody {
    #[serde(default)]
    pub reason: Option<MissionReason>,
}

/// Response of `POST /start_mission`
#[derive(Debug, Serialize, Deserialize)]
pub struct MissionResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<MissionOutcome>,
}

fn reply(code: StatusCode, status: &str, message: impl Into<String>) -> Response {
    let body = MissionResponse {
        status: status.to_string(),
        message: message.into(),
        outcome: None,
    };
    (code, Json(body)).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(';')
                .next()
                .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
                .unwrap_or(false)
        })
        .unwrap_or(false)
}

/// Run one cleaning mission on demand
async fn start_mission(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorized = match (state.api_token.as_deref(), bearer_token(&headers)) {
        (Some(expected), Some(given)) => !expected.is_empty() && expected == given,
        _ => false,
    };
    if !authorized {
        warn!("Mission trigger rejected: missing or invalid bearer token");
        return reply(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Missing or invalid bearer token",
        );
    }

    let request = if body.iter().all(u8::is_ascii_whitespace) {
        StartMissionBody::default()
    } else {
        if !is_json(&headers) {
            return reply(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "INVALID_CONTENT_TYPE",
                "Request body must be application/json",
            );
        }
        match serde_json::from_slice::<StartMissionBody>(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                return reply(
                    StatusCode::BAD_REQUEST,
                    "INVALID_REQUEST",
                    format!("Invalid request body: {e}"),
                )
            }
        }
    };

    let reason = request.reason.unwrap_or(MissionReason::Manual);
    info!(reason = %reason, "Mission requested over HTTP");

    // Detached: a dropped request must not cancel the sequence between phases.
    let run = tokio::spawn({
        let state = state.clone();
        async move {
            let result = state
                .controller
                .start_mission(MissionRequest::new(reason))
                .await;
            if let Ok(outcome) = &result {
                state.metrics.record_mission(outcome);
                state.logger.log_mission(outcome);
            }
            result
        }
    });
    let result = match run.await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Mission task failed");
            return reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Mission task failed",
            );
        }
    };

    match result {
        Ok(outcome) => {
            let (code, status) = if outcome.status.is_success() {
                (StatusCode::OK, "MISSION_COMPLETE")
            } else {
                (StatusCode::INTERNAL_SERVER_ERROR, "MISSION_FAILURE")
            };
            let body = MissionResponse {
                status: status.to_string(),
                message: outcome.status.to_string(),
                outcome: Some(outcome),
            };
            (code, Json(body)).into_response()
        }
        Err(MissionError::Busy) => {
            state.metrics.inc_missions_rejected();
            reply(
                StatusCode::CONFLICT,
                "MISSION_IN_PROGRESS",
                MissionError::Busy.to_string(),
            )
        }
        Err(e @ MissionError::ShutDown) => reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            e.to_string(),
        ),
    }
}

/// Current mission state
async fn mission_state(State(state): State<Arc<AppState>>) -> Json<MissionState> {
    Json(state.controller.state())
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
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/start_mission", post(start_mission))
        .route("/mission/state", get(mission_state))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
