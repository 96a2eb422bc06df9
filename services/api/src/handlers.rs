//! Axum Handlers for the REST API
//!
//! Service banner and health check. Voice traffic goes through the WebSocket
//! route instead.

use axum::{extract::State, response::Json};
use std::sync::Arc;

use crate::{
    models::{BannerResponse, HealthResponse, SERVICE_NAME},
    state::AppState,
};

/// Service banner.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service banner", body = BannerResponse)
    )
)]
pub async fn root() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "Jarvis AI Service".to_string(),
    })
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.sessions.len(),
    })
}
