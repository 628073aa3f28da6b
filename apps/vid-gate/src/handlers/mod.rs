//! HTTP and WebSocket handlers

pub mod status;
pub mod stream;
