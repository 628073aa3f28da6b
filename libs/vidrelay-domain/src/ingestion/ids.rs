use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::ingestion::error::IngestionError;

/// Longest file name most filesystems allow, in bytes
const FILE_NAME_MAX: usize = 255;

/// Scratch files are named `<connection id>_<object name>`
const SCRATCH_PREFIX_LEN: usize = 36 + 1;

/// Longest object name accepted, in bytes
///
/// Leaves room for the connection prefix so the scratch file name still fits
/// within [`FILE_NAME_MAX`].
pub const MAX_OBJECT_NAME_LEN: usize = FILE_NAME_MAX - SCRATCH_PREFIX_LEN;

/// Unique identifier for a Transfer Session
///
/// SessionId is a wrapper around UUID v7 to provide type safety and prevent
/// mixing up session IDs with connection IDs or other UUIDs in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new SessionId
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the inner UUID value
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token identifying one live client connection
///
/// Minted by the transport layer when a connection is accepted and dropped
/// when it closes. Every session is owned by exactly one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new ConnectionId
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sanitized object name
///
/// Object names come from an untrusted client and end up as file names in the
/// scratch directory and as keys in the remote store, so construction rejects
/// anything that could escape a directory: path separators, parent/current
/// directory markers, NUL and other control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectName(String);

impl ObjectName {
    /// Validate a raw client-supplied name
    ///
    /// Surrounding whitespace is trimmed; everything else must already be safe.
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::InvalidName` if the name is empty after
    /// trimming, too long, or contains unsafe characters.
    pub fn parse(raw: &str) -> Result<Self, IngestionError> {
        let name = raw.trim();

        if name.is_empty() {
            return Err(IngestionError::invalid_name(raw, "name is empty"));
        }
        if name.len() > MAX_OBJECT_NAME_LEN {
            return Err(IngestionError::invalid_name(
                raw,
                format!("name exceeds {} bytes", MAX_OBJECT_NAME_LEN),
            ));
        }
        if name == "." || name == ".." {
            return Err(IngestionError::invalid_name(raw, "name is a directory marker"));
        }
        if name.contains(|c| c == '/' || c == '\\') {
            return Err(IngestionError::invalid_name(raw, "name contains a path separator"));
        }
        if name.chars().any(char::is_control) {
            return Err(IngestionError::invalid_name(raw, "name contains control characters"));
        }
        if name.starts_with('.') {
            return Err(IngestionError::invalid_name(raw, "hidden names are not allowed"));
        }

        Ok(Self(name.to_string()))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of the account that owns an upload in the system-of-record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
