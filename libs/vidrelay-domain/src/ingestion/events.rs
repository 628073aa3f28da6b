//! Events sent back to the uploading client

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Server-to-client event
///
/// Serialized as a JSON object tagged by `event`, e.g.
/// `{"event":"ack","seq":3}` or `{"event":"upload-error","message":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Sent once when the connection is established
    Connected,
    /// Both sinks accepted fragment `seq`
    Ack { seq: u64 },
    /// Running byte count for an object
    Progress {
        name: String,
        #[serde(rename = "bytesAccepted")]
        bytes_accepted: u64,
    },
    /// Generic failure notice; never carries internal error details
    UploadError { message: String },
    /// The object was stored and the system-of-record notified
    Finalized { name: String, locator: String },
}

impl ClientEvent {
    pub fn upload_error(message: impl Into<String>) -> Self {
        Self::UploadError {
            message: message.into(),
        }
    }
}

/// Outbound event channel of one connection
pub type EventSender = mpsc::UnboundedSender<ClientEvent>;

/// Send an event, ignoring a client that has already gone away
pub fn emit(events: &EventSender, event: ClientEvent) {
    if events.send(event).is_err() {
        debug!("Client event channel closed, dropping event");
    }
}
