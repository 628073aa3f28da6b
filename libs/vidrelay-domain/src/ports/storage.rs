use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ingestion::{ConnectionId, ObjectName, SinkError};
use crate::ports::ByteSink;

/// Durable reference returned by the remote store after a completed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator(String);

impl Locator {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Port for the local scratch directory
///
/// The scratch store hands out Local Sinks (one file per session) and owns the
/// file-level operations the Finalizer needs afterwards.
pub trait ScratchStore: Send + Sync + 'static {
    /// Local Sink type; resolves to the number of bytes persisted
    type Sink: ByteSink<Output = u64>;

    /// Scratch path for a session
    ///
    /// Must be unique per (connection, name) pair.
    fn scratch_path(&self, connection: &ConnectionId, name: &ObjectName) -> PathBuf;

    /// Create (truncate) the scratch file and open a sink on it
    fn create(&self, path: &Path) -> impl Future<Output = Result<Self::Sink, SinkError>> + Send;

    /// Current size of the scratch file in bytes
    fn size(&self, path: &Path) -> impl Future<Output = Result<u64, SinkError>> + Send;

    /// Read the whole scratch file
    fn read(&self, path: &Path) -> impl Future<Output = Result<Bytes, SinkError>> + Send;

    /// Delete the scratch file
    ///
    /// Returns `Ok(false)` when the file was already absent; that is not an error.
    fn remove(&self, path: &Path) -> impl Future<Output = Result<bool, SinkError>> + Send;
}

/// Port for the remote object store
///
/// Uploads are scoped to a fixed logical folder and keyed by the sanitized
/// object name; the folder is adapter configuration.
pub trait RemoteStore: Send + Sync + 'static {
    /// Remote Sink type; resolves to the durable locator of the object
    type Sink: ByteSink<Output = Locator>;

    /// Start an upload for the object
    fn open(&self, name: &ObjectName) -> impl Future<Output = Result<Self::Sink, SinkError>> + Send;
}
