//! Route configuration

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::api::AppState;
use crate::config::Config;
use crate::error::{Result, SupportError};

/// Build the application router
pub fn build_router(state: AppState, config: &Config) -> Result<Router> {
    let cors = cors_layer(config)?;

    Ok(Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/chat", post(handlers::chat))
        .route("/sessions/count", get(handlers::session_count))
        .route("/sessions/cleanup", post(handlers::cleanup_sessions))
        .route("/metrics", get(handlers::metrics))
        .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state))
}

/// Cross-origin policy for the browser frontend.
/// Origins are listed explicitly; credentials support forbids wildcards.
fn cors_layer(config: &Config) -> Result<CorsLayer> {
    let origins = config
        .cors_origins_list()
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|e| {
                SupportError::Configuration(format!("invalid CORS origin {origin:?}: {e}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true))
}
