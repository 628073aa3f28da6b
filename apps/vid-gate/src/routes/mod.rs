//! API routes

pub mod stream;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    dto::messages::SessionsResponse,
    handlers::{self, status::{health_handler, sessions_handler}},
    AppState,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::stream::ws_handler,
        handlers::status::sessions_handler,
        handlers::status::health_handler
    ),
    components(
        schemas(SessionsResponse)
    ),
    tags(
        (name = "stream", description = "Fragment streaming over WebSocket"),
        (name = "status", description = "Health and session gauges")
    ),
    info(
        title = "VidGate API",
        version = "0.1.0",
        description = "WebSocket gateway relaying streamed video fragments to scratch and S3"
    )
)]
pub struct ApiDoc;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(stream::routes())
        .route("/sessions", get(sessions_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
