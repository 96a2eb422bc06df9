//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST routes, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{BannerResponse, HealthResponse},
    state::AppState,
    ws::{self, ws_handler},
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::root,
        handlers::health,
        ws::session::ws_handler,
    ),
    components(
        schemas(BannerResponse, HealthResponse)
    ),
    tags(
        (name = "Jarvis API", description = "Voice assistant service")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/ws/ai", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        assert!(paths.contains(&"/"));
        assert!(paths.contains(&"/health"));
        assert!(paths.contains(&"/ws/ai"));
    }
}
