//! S3 Remote Store Implementation
//!
//! This module implements the `RemoteStore` port using S3 multipart uploads.
//! A Remote Sink starts the multipart upload when it is opened, cuts the
//! incoming byte stream into fixed-size parts, and completes the upload when
//! it is ended. Any path that does not complete the upload aborts it.

use aws_sdk_s3::{
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use vidrelay_domain::{
    ingestion::{ObjectName, SinkError, DEFAULT_MEDIA_TYPE},
    ports::{Acceptance, ByteSink, Locator, RemoteStore},
    ChannelSink,
};

/// S3 rejects non-final parts smaller than 5 MiB
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Default part size (8 MiB)
pub const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;

/// S3 limit on the number of parts of one upload
pub const MAX_PARTS: i32 = 10_000;

/// Default folder objects are uploaded under
pub const DEFAULT_FOLDER: &str = "opal";

/// Fragments a Remote Sink buffers before reporting saturation
pub const DEFAULT_BUFFER_FRAGMENTS: usize = 16;

/// S3-based implementation of the RemoteStore port
///
/// Objects are stored as `<folder>/<object name>` in a single bucket.
///
/// ## Locators
///
/// With a public base URL configured the locator of an object is
/// `<public base>/<key>`; otherwise it is `s3://<bucket>/<key>`.
///
/// ## Error Handling
///
/// All AWS SDK errors are converted to `SinkError::Provider` with descriptive
/// error messages for debugging.
#[derive(Clone)]
pub struct S3RemoteStore {
    client: Client,
    bucket: String,
    folder: String,
    public_base_url: Option<String>,
    content_type: String,
    part_size: usize,
    buffer_fragments: usize,
}

impl S3RemoteStore {
    /// Create a new S3 remote store
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use aws_sdk_s3::Client;
    /// use vidrelay_s3::infrastructure::S3RemoteStore;
    ///
    /// # fn example(s3_client: Client) {
    /// let store = S3RemoteStore::new(s3_client, "vidrelay".to_string())
    ///     .with_folder("opal")
    ///     .with_part_size(8 * 1024 * 1024);
    /// # }
    /// ```
    pub fn new(client: Client, bucket: String) -> Self {
        info!(bucket = %bucket, "Initializing S3RemoteStore");
        Self {
            client,
            bucket,
            folder: DEFAULT_FOLDER.to_string(),
            public_base_url: None,
            content_type: DEFAULT_MEDIA_TYPE.to_string(),
            part_size: DEFAULT_PART_SIZE,
            buffer_fragments: DEFAULT_BUFFER_FRAGMENTS,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into().trim_matches('/').to_string();
        self
    }

    pub fn with_public_base_url(mut self, public_base_url: Option<String>) -> Self {
        self.public_base_url = public_base_url.map(|url| url.trim_end_matches('/').to_string());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Set the multipart part size; raised to [`MIN_PART_SIZE`] if smaller
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        if part_size < MIN_PART_SIZE {
            warn!(
                part_size = part_size,
                min = MIN_PART_SIZE,
                "Part size below the S3 minimum, using the minimum"
            );
        }
        self.part_size = part_size.max(MIN_PART_SIZE);
        self
    }

    pub fn with_buffer_fragments(mut self, buffer_fragments: usize) -> Self {
        self.buffer_fragments = buffer_fragments;
        self
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Generate the S3 key for an object
    fn object_key(&self, name: &ObjectName) -> String {
        if self.folder.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.folder, name)
        }
    }

    fn locator(&self, key: &str) -> Locator {
        match &self.public_base_url {
            Some(base) => Locator::new(format!("{}/{}", base, key)),
            None => Locator::new(format!("s3://{}/{}", self.bucket, key)),
        }
    }
}

impl RemoteStore for S3RemoteStore {
    type Sink = S3RemoteSink;

    #[instrument(skip(self, name), fields(name = %name))]
    fn open(
        &self,
        name: &ObjectName,
    ) -> impl std::future::Future<Output = Result<Self::Sink, SinkError>> + Send {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = self.object_key(name);
        let locator = self.locator(&key);
        let content_type = self.content_type.clone();
        let part_size = self.part_size;
        let buffer_fragments = self.buffer_fragments;

        async move {
            debug!(key = %key, bucket = %bucket, "Creating multipart upload");

            let output = client
                .create_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .content_type(content_type)
                .send()
                .await
                .map_err(|err| {
                    error!(key = %key, error = ?err, "Failed to create multipart upload");
                    SinkError::provider(format!(
                        "S3 create_multipart_upload failed for key '{}': {}",
                        key, err
                    ))
                })?;

            let upload_id = output
                .upload_id()
                .ok_or_else(|| {
                    SinkError::provider(format!("S3 returned no upload id for key '{}'", key))
                })?
                .to_string();

            info!(key = %key, upload_id = %upload_id, "Multipart upload started");

            let upload = MultipartUpload {
                client,
                bucket,
                key,
                upload_id,
            };
            let writer_upload = upload.clone();
            let inner = ChannelSink::spawn(buffer_fragments, move |fragments| {
                write_upload(writer_upload, PartBuffer::new(part_size), locator, fragments)
            });

            Ok(S3RemoteSink {
                inner: Some(inner),
                upload: Some(upload),
            })
        }
    }
}

/// Remote Sink backed by one S3 multipart upload
///
/// The upload is aborted on the provider side unless `end` completed it,
/// including when the sink is dropped mid-transfer.
pub struct S3RemoteSink {
    inner: Option<ChannelSink<Locator>>,
    upload: Option<MultipartUpload>,
}

impl ByteSink for S3RemoteSink {
    type Output = Locator;

    fn write(&mut self, chunk: Bytes) -> Result<Acceptance, SinkError> {
        self.inner.as_mut().ok_or(SinkError::Closed)?.write(chunk)
    }

    fn drained(&mut self) -> impl std::future::Future<Output = Result<(), SinkError>> + Send {
        async move {
            match self.inner.as_mut() {
                Some(inner) => inner.drained().await,
                None => Err(SinkError::Closed),
            }
        }
    }

    fn end(mut self) -> impl std::future::Future<Output = Result<Locator, SinkError>> + Send {
        async move {
            let inner = self.inner.take().ok_or(SinkError::Closed)?;
            let locator = inner.end().await?;
            // Completed: nothing left to abort
            self.upload = None;
            Ok(locator)
        }
    }

    fn abort(mut self) -> impl std::future::Future<Output = ()> + Send {
        async move {
            if let Some(inner) = self.inner.take() {
                inner.abort().await;
            }
            // Dropping `self` aborts the multipart upload
        }
    }
}

impl Drop for S3RemoteSink {
    fn drop(&mut self) {
        let Some(upload) = self.upload.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(upload.abort());
            }
            Err(_) => warn!(
                key = %upload.key,
                upload_id = %upload.upload_id,
                "No runtime available, multipart upload left for lifecycle cleanup"
            ),
        }
    }
}

/// Identity of one multipart upload
#[derive(Clone)]
struct MultipartUpload {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
}

impl MultipartUpload {
    async fn upload_part(&self, part_number: i32, body: Bytes) -> Result<CompletedPart, SinkError> {
        if part_number > MAX_PARTS {
            return Err(SinkError::provider(format!(
                "object '{}' exceeds {} parts",
                self.key, MAX_PARTS
            )));
        }
        let size = body.len();

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| {
                error!(key = %self.key, part_number = part_number, error = ?err, "Failed to upload part");
                SinkError::provider(format!(
                    "S3 upload_part {} failed for key '{}': {}",
                    part_number, self.key, err
                ))
            })?;

        debug!(key = %self.key, part_number = part_number, size = size, "Part uploaded");

        Ok(CompletedPart::builder()
            .set_e_tag(output.e_tag().map(str::to_string))
            .part_number(part_number)
            .build())
    }

    async fn complete(&self, parts: Vec<CompletedPart>) -> Result<(), SinkError> {
        let part_count = parts.len();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| {
                error!(key = %self.key, error = ?err, "Failed to complete multipart upload");
                SinkError::provider(format!(
                    "S3 complete_multipart_upload failed for key '{}': {}",
                    self.key, err
                ))
            })?;

        info!(key = %self.key, parts = part_count, "Multipart upload completed");
        Ok(())
    }

    /// Best effort; failures are only logged
    async fn abort(self) {
        match self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
        {
            Ok(_) => info!(key = %self.key, upload_id = %self.upload_id, "Multipart upload aborted"),
            Err(err) => warn!(
                key = %self.key,
                upload_id = %self.upload_id,
                error = ?err,
                "Failed to abort multipart upload"
            ),
        }
    }
}

/// Writer task of a Remote Sink
async fn write_upload(
    upload: MultipartUpload,
    mut buffer: PartBuffer,
    locator: Locator,
    mut fragments: mpsc::Receiver<Bytes>,
) -> Result<Locator, SinkError> {
    let mut parts = Vec::new();

    while let Some(chunk) = fragments.recv().await {
        for body in buffer.push(&chunk) {
            let part_number = parts.len() as i32 + 1;
            parts.push(upload.upload_part(part_number, body).await?);
        }
    }

    // An upload needs at least one part, even an empty one
    if let Some(body) = buffer.finish(parts.is_empty()) {
        let part_number = parts.len() as i32 + 1;
        parts.push(upload.upload_part(part_number, body).await?);
    }

    upload.complete(parts).await?;
    Ok(locator)
}

/// Cuts a byte stream into parts of exactly `part_size` bytes
struct PartBuffer {
    part_size: usize,
    buf: BytesMut,
}

impl PartBuffer {
    fn new(part_size: usize) -> Self {
        Self {
            part_size,
            buf: BytesMut::new(),
        }
    }

    /// Append a fragment, returning every part it completed
    fn push(&mut self, mut chunk: &[u8]) -> Vec<Bytes> {
        let mut parts = Vec::new();

        while !chunk.is_empty() {
            let take = (self.part_size - self.buf.len()).min(chunk.len());
            self.buf.extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];

            if self.buf.len() == self.part_size {
                parts.push(self.buf.split().freeze());
            }
        }
        parts
    }

    /// The trailing partial part, if any (or an empty one when `force`d)
    fn finish(self, force: bool) -> Option<Bytes> {
        if self.buf.is_empty() && !force {
            None
        } else {
            Some(self.buf.freeze())
        }
    }
}
