//! Operational endpoints

use axum::{extract::State, Json};

use crate::{dto::messages::SessionsResponse, AppState};

/// Number of live transfer sessions
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Live transfer sessions across all connections", body = SessionsResponse)
    ),
    tag = "status"
)]
pub async fn sessions_handler(State(state): State<AppState>) -> Json<SessionsResponse> {
    Json(SessionsResponse {
        active: state.relay.active_sessions(),
    })
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = String)
    ),
    tag = "status"
)]
pub async fn health_handler() -> &'static str {
    "OK"
}
