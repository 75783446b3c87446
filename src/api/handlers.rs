//! HTTP handlers

use axum::{
    extract::State,
    http::{header, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::api::error_codes;
use crate::api::models::{
    ApiError, ChatRequest, ChatResponse, CleanupResponse, HealthResponse, SessionCountResponse,
};
use crate::metrics::METRICS;
use crate::orchestrator::{ChatQuery, Orchestrator};
use crate::session::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<SessionRegistry>,
    pub idle_timeout: chrono::Duration,
}

/// Main chat endpoint
///
/// POST /chat
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ApiError>)> {
    if request.message.trim().is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiError::new(
                error_codes::VALIDATION_ERROR,
                "message cannot be empty",
            )),
        ));
    }

    info!(
        preview = %request.message.chars().take(100).collect::<String>(),
        "received chat request"
    );

    let exchange = state
        .orchestrator
        .handle(ChatQuery {
            message: request.message,
            session_id: request.session_id,
            customer_id: request.customer_id,
        })
        .await;

    Ok(Json(ChatResponse::from(exchange)))
}

/// Root health check
///
/// GET /
pub async fn root() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Health check
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Number of live sessions
///
/// GET /sessions/count
pub async fn session_count(State(state): State<AppState>) -> Json<SessionCountResponse> {
    Json(SessionCountResponse {
        active_sessions: state.registry.count(),
    })
}

/// Manually trigger the expiry sweep
///
/// POST /sessions/cleanup
pub async fn cleanup_sessions(State(state): State<AppState>) -> Json<CleanupResponse> {
    let removed = state.registry.sweep_expired(state.idle_timeout);
    info!(removed, "manual session cleanup");

    Json(CleanupResponse {
        message: "Expired sessions cleaned up".to_string(),
        active_sessions: state.registry.count(),
    })
}

/// Prometheus exposition endpoint
///
/// GET /metrics
pub async fn metrics() -> ([(header::HeaderName, &'static str); 1], String) {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
}
