//! Filesystem Scratch Store Implementation
//!
//! This module implements the `ScratchStore` port on a local directory. Each
//! Local Sink is a `ChannelSink` whose writer task owns a buffered file handle.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::{
    fs::{self, File},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
};
use tracing::{debug, error, info, instrument, warn};
use vidrelay_domain::{
    ingestion::{ConnectionId, ObjectName, SinkError},
    ports::ScratchStore,
    ChannelSink,
};

/// Fragments a Local Sink buffers before reporting saturation
pub const DEFAULT_BUFFER_FRAGMENTS: usize = 16;

/// Local Sink: resolves to the number of bytes persisted
pub type FileSink = ChannelSink<u64>;

/// Scratch directory holding one file per live transfer
///
/// File names are `<connection id>_<object name>`, so two connections
/// uploading the same object name never share a file.
#[derive(Debug, Clone)]
pub struct FsScratchStore {
    dir: PathBuf,
    buffer_fragments: usize,
}

impl FsScratchStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        info!(dir = %dir.display(), "Initializing FsScratchStore");
        Self {
            dir,
            buffer_fragments: DEFAULT_BUFFER_FRAGMENTS,
        }
    }

    /// Set how many fragments a Local Sink buffers
    pub fn with_buffer_fragments(mut self, buffer_fragments: usize) -> Self {
        self.buffer_fragments = buffer_fragments;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the scratch directory if it does not exist yet
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Io` if the directory cannot be created.
    pub async fn ensure_dir(&self) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir).await.map_err(|err| {
            error!(dir = %self.dir.display(), error = %err, "Failed to create scratch directory");
            SinkError::io(format!(
                "cannot create scratch directory '{}': {}",
                self.dir.display(),
                err
            ))
        })
    }
}

/// Writer task of a Local Sink
async fn write_file(
    file: File,
    path: PathBuf,
    mut fragments: mpsc::Receiver<Bytes>,
) -> Result<u64, SinkError> {
    let mut writer = BufWriter::new(file);
    let mut written: u64 = 0;

    while let Some(chunk) = fragments.recv().await {
        if let Err(err) = writer.write_all(&chunk).await {
            error!(path = %path.display(), error = %err, "Failed to write scratch file");
            return Err(err.into());
        }
        written += chunk.len() as u64;
    }

    writer.flush().await?;
    writer.get_ref().sync_all().await?;

    debug!(path = %path.display(), bytes = written, "Scratch file completed");
    Ok(written)
}

impl ScratchStore for FsScratchStore {
    type Sink = FileSink;

    fn scratch_path(&self, connection: &ConnectionId, name: &ObjectName) -> PathBuf {
        self.dir.join(format!("{}_{}", connection, name))
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    fn create(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = Result<Self::Sink, SinkError>> + Send {
        let path = path.to_path_buf();
        let buffer_fragments = self.buffer_fragments;

        async move {
            let file = File::create(&path).await.map_err(|err| {
                error!(path = %path.display(), error = %err, "Failed to create scratch file");
                SinkError::io(format!(
                    "cannot create scratch file '{}': {}",
                    path.display(),
                    err
                ))
            })?;

            debug!(path = %path.display(), "Scratch file created");
            Ok(ChannelSink::spawn(buffer_fragments, move |fragments| {
                write_file(file, path, fragments)
            }))
        }
    }

    fn size(&self, path: &Path) -> impl std::future::Future<Output = Result<u64, SinkError>> + Send {
        let path = path.to_path_buf();

        async move {
            let metadata = fs::metadata(&path).await?;
            Ok(metadata.len())
        }
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    fn read(&self, path: &Path) -> impl std::future::Future<Output = Result<Bytes, SinkError>> + Send {
        let path = path.to_path_buf();

        async move {
            let data = fs::read(&path).await.map_err(|err| {
                warn!(path = %path.display(), error = %err, "Failed to read scratch file");
                SinkError::from(err)
            })?;
            debug!(path = %path.display(), size = data.len(), "Scratch file read");
            Ok(Bytes::from(data))
        }
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    fn remove(&self, path: &Path) -> impl std::future::Future<Output = Result<bool, SinkError>> + Send {
        let path = path.to_path_buf();

        async move {
            match fs::remove_file(&path).await {
                Ok(()) => Ok(true),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Failed to delete scratch file");
                    Err(err.into())
                }
            }
        }
    }
}
