//! Streaming routes

use axum::{routing::get, Router};

use crate::{handlers::stream::ws_handler, AppState};

/// Create the WebSocket route
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}
