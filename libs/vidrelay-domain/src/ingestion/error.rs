//! Domain errors for relay operations
//!
//! This module defines all possible errors that can occur while a transfer is
//! streamed, finalized or enriched. These are domain-level errors that abstract
//! away infrastructure details: adapters convert AWS, HTTP and filesystem
//! errors into `SinkError`, `CatalogError` and `EnrichmentError` before they
//! reach the core.

use std::fmt;

use thiserror::Error;

use crate::ingestion::entity::SessionState;

/// Which of the two sinks of a session an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Local,
    Remote,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::Local => f.write_str("local"),
            SinkKind::Remote => f.write_str("remote"),
        }
    }
}

/// Which system-of-record call an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogCall {
    Processing,
    Transcribed,
    Complete,
}

impl fmt::Display for CatalogCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogCall::Processing => f.write_str("processing"),
            CatalogCall::Transcribed => f.write_str("transcribed"),
            CatalogCall::Complete => f.write_str("complete"),
        }
    }
}

/// Which enrichment provider call an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrichmentStage {
    Transcription,
    Summary,
}

impl fmt::Display for EnrichmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichmentStage::Transcription => f.write_str("transcription"),
            EnrichmentStage::Summary => f.write_str("summary"),
        }
    }
}

/// Failure reported by a sink implementation
#[derive(Error, Debug)]
pub enum SinkError {
    /// Local I/O failed
    #[error("I/O error: {0}")]
    Io(String),

    /// The sink's writer stopped before the data was handed over
    #[error("sink closed before the write was accepted")]
    Closed,

    /// The storage provider rejected an operation
    #[error("provider error: {0}")]
    Provider(String),
}

impl SinkError {
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failure reported by the system-of-record client
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The request never produced a response
    #[error("catalog transport error: {0}")]
    Transport(String),

    /// The system-of-record answered with a non-success status
    #[error("catalog rejected the request with status {status}")]
    Rejected { status: u16 },

    /// The response body could not be decoded
    #[error("catalog response could not be parsed: {0}")]
    Parse(String),
}

/// Failure reported by the enrichment provider
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("enrichment transport error: {0}")]
    Transport(String),

    #[error("enrichment provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("enrichment response could not be parsed: {0}")]
    Parse(String),

    #[error("enrichment provider is not configured")]
    NotConfigured,
}

/// Errors that can occur while relaying a transfer
///
/// Only `user_message` is ever shown to the client; the variants themselves
/// stay on the server side and in the logs.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// The object name is empty or could escape the scratch directory
    #[error("Invalid object name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// No streaming session exists for the object
    #[error("No active session for '{name}'")]
    SessionNotFound { name: String },

    /// The sender exceeded its outstanding fragment budget
    #[error("Session '{name}' exceeded {limit} unacknowledged fragments")]
    InFlightLimit { name: String, limit: usize },

    /// A sink could not be opened for a new session
    #[error("Failed to open {sink} sink: {source}")]
    SinkOpen {
        sink: SinkKind,
        #[source]
        source: SinkError,
    },

    /// A sink rejected a write outright (not backpressure)
    #[error("Hard write failure on {sink} sink: {source}")]
    SinkWrite {
        sink: SinkKind,
        #[source]
        source: SinkError,
    },

    /// A sink failed to complete after `end`
    #[error("Failed to finalize {sink} sink: {source}")]
    Finalize {
        sink: SinkKind,
        #[source]
        source: SinkError,
    },

    /// The system-of-record rejected a required call
    #[error("Catalog '{call}' call failed: {source}")]
    Catalog {
        call: CatalogCall,
        #[source]
        source: CatalogError,
    },

    /// The enrichment provider failed (never fatal to a transfer)
    #[error("Enrichment {stage} failed: {source}")]
    Enrichment {
        stage: EnrichmentStage,
        #[source]
        source: EnrichmentError,
    },

    /// The summary payload was not the expected structured data
    #[error("Malformed summary payload: {0}")]
    Parse(String),

    /// The session state machine was asked for an illegal move
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An unexpected internal error occurred
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IngestionError {
    /// Create an invalid name error
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a session not found error
    pub fn session_not_found(name: impl Into<String>) -> Self {
        Self::SessionNotFound { name: name.into() }
    }

    /// Create a hard sink write error
    pub fn sink_write(sink: SinkKind, source: SinkError) -> Self {
        Self::SinkWrite { sink, source }
    }

    /// Create a sink finalization error
    pub fn finalize(sink: SinkKind, source: SinkError) -> Self {
        Self::Finalize { sink, source }
    }

    /// Create a catalog error
    pub fn catalog(call: CatalogCall, source: CatalogError) -> Self {
        Self::Catalog { call, source }
    }

    /// Create an enrichment error
    pub fn enrichment(stage: EnrichmentStage, source: EnrichmentError) -> Self {
        Self::Enrichment { stage, source }
    }

    /// Create a config error with a message
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create an internal error with a message
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Short human-readable message sent to the client as `upload-error`
    pub fn user_message(&self) -> &'static str {
        match self {
            IngestionError::InvalidName { .. } => "Invalid file name",
            IngestionError::SessionNotFound { .. } => "No active upload for this file",
            IngestionError::InFlightLimit { .. } => "Too many unacknowledged video chunks",
            IngestionError::SinkOpen { .. } | IngestionError::SinkWrite { .. } => {
                "Failed to save video chunk"
            }
            IngestionError::Finalize { .. } => "Failed to upload video",
            IngestionError::Catalog {
                call: CatalogCall::Processing,
                ..
            } => "Failed to create processing file",
            IngestionError::Catalog { .. } => "Failed to complete processing",
            _ => "Failed to process video",
        }
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, IngestionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_name_error() {
        let err = IngestionError::invalid_name("../x", "name contains a path separator");
        assert!(matches!(err, IngestionError::InvalidName { .. }));
        assert_eq!(
            err.to_string(),
            "Invalid object name '../x': name contains a path separator"
        );
    }

    #[test]
    fn test_sink_write_error_names_the_sink() {
        let err = IngestionError::sink_write(SinkKind::Remote, SinkError::provider("503"));
        assert!(err.to_string().contains("remote"));
        assert!(err.to_string().contains("503"));
        assert_eq!(err.user_message(), "Failed to save video chunk");
    }

    #[test]
    fn test_catalog_user_messages_differ_by_call() {
        let processing = IngestionError::catalog(
            CatalogCall::Processing,
            CatalogError::Rejected { status: 500 },
        );
        let complete =
            IngestionError::catalog(CatalogCall::Complete, CatalogError::Rejected { status: 500 });

        assert_eq!(processing.user_message(), "Failed to create processing file");
        assert_eq!(complete.user_message(), "Failed to complete processing");
    }

    #[test]
    fn test_user_message_hides_internal_details() {
        let err = IngestionError::internal_error("worker panicked at src/flow.rs:42");
        assert!(!err.user_message().contains("flow.rs"));
    }
}
