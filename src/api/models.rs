//! API request/response types

use crate::orchestrator::ChatExchange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Incoming chat request
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

/// Outgoing chat response
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub routed_to: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

impl From<ChatExchange> for ChatResponse {
    fn from(exchange: ChatExchange) -> Self {
        Self {
            response: exchange.answer,
            routed_to: exchange.routed_to.label().to_string(),
            session_id: exchange.session_id,
            timestamp: exchange.timestamp,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
        }
    }
}

/// Active session count
#[derive(Debug, Clone, Serialize)]
pub struct SessionCountResponse {
    pub active_sessions: usize,
}

/// Result of a manual session cleanup
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub active_sessions: usize,
}

/// Error body returned alongside a non-2xx status
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: code.into(),
            message: message.into(),
        }
    }
}
