//! WebSocket streaming handler
//!
//! One socket is one connection. Inbound frames are decoded and handed to the
//! relay in receive order; outbound client events are serialized by a writer
//! task that owns the sending half of the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vidrelay_domain::{
    ingestion::{emit, EventSender},
    ClientEvent, ConnectionId,
};

use crate::{
    dto::{frame::FrameError, messages::Inbound},
    AppState, Relay,
};

/// Upgrade to the streaming protocol
#[utoipa::path(
    get,
    path = "/ws",
    responses(
        (status = 101, description = "Switched to the WebSocket streaming protocol"),
        (status = 400, description = "Not a WebSocket upgrade request")
    ),
    tag = "stream"
)]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection = ConnectionId::new();
    let (mut outbound, mut inbound) = socket.split();
    let (events, mut pending) = mpsc::unbounded_channel::<ClientEvent>();

    info!(connection_id = %connection, "Client connected");

    let writer = tokio::spawn(async move {
        while let Some(event) = pending.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "Failed to serialize client event");
                    continue;
                }
            };
            if outbound.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    emit(&events, ClientEvent::Connected);

    while let Some(message) = inbound.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!(connection_id = %connection, error = %err, "WebSocket receive failed");
                break;
            }
        };

        let decoded = match message {
            Message::Binary(data) => Inbound::from_binary(Bytes::from(data)),
            Message::Text(text) => Inbound::from_text(&text),
            Message::Close(_) => break,
            // Ping and pong are answered by axum
            _ => continue,
        };

        dispatch(&state.relay, connection, &events, decoded);
    }

    let cancelled = state.relay.disconnect(connection);
    writer.abort();

    info!(
        connection_id = %connection,
        sessions_cancelled = cancelled,
        "Client disconnected"
    );
}

/// Hand one decoded client command to the relay
///
/// Failures are reported to the client as `upload-error`; the connection
/// stays open.
fn dispatch(
    relay: &Relay,
    connection: ConnectionId,
    events: &EventSender,
    decoded: Result<Inbound, FrameError>,
) {
    let result = match decoded {
        Ok(Inbound::Fragment(frame)) => relay
            .fragment(connection, events, &frame.name, frame.payload, frame.seq)
            .map(|_| ()),
        Ok(Inbound::Finalize { name, user }) => relay.finalize(connection, &name, user).map(|_| ()),
        Err(err) => {
            warn!(connection_id = %connection, error = %err, "Rejected malformed client message");
            emit(events, ClientEvent::upload_error(err.user_message()));
            return;
        }
    };

    if let Err(err) = result {
        warn!(connection_id = %connection, error = %err, "Client command failed");
        emit(events, ClientEvent::upload_error(err.user_message()));
    }
}
