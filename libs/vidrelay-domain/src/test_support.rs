//! In-memory port implementations shared by the unit tests

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::Notify;

use crate::{
    ingestion::{
        CatalogError, ConnectionId, EnrichmentError, ObjectName, SinkError, StructuredContent,
        UserId,
    },
    ports::{
        Acceptance, ByteSink, CatalogClient, EnrichmentProvider, Locator, PlanTier,
        ProcessingTicket, RemoteStore, ScratchStore, CATALOG_OK,
    },
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

#[derive(Debug, Default)]
pub struct TapState {
    label: String,
    written: Vec<u8>,
    writes: usize,
    saturated: bool,
    fail_on_write: Option<usize>,
    fail_on_end: bool,
    ended: bool,
    aborted: bool,
}

/// Shared view into a [`MemorySink`], kept by the test after the sink moves
#[derive(Clone, Default)]
pub struct SinkTap {
    state: Arc<Mutex<TapState>>,
    drain: Arc<Notify>,
}

impl SinkTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labeled(label: impl Into<String>) -> Self {
        let tap = Self::new();
        lock(&tap.state).label = label.into();
        tap
    }

    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    pub fn writes(&self) -> usize {
        lock(&self.state).writes
    }

    pub fn is_ended(&self) -> bool {
        lock(&self.state).ended
    }

    pub fn is_aborted(&self) -> bool {
        lock(&self.state).aborted
    }

    /// Make every following write report `Saturated`
    pub fn set_saturated(&self, saturated: bool) {
        lock(&self.state).saturated = saturated;
    }

    /// Let one pending (or the next) drain complete
    pub fn release_drain(&self) {
        self.drain.notify_one();
    }

    /// Fail the write with this zero-based index, and every one after it
    pub fn fail_on_write(&self, index: usize) {
        lock(&self.state).fail_on_write = Some(index);
    }

    pub fn fail_on_end(&self) {
        lock(&self.state).fail_on_end = true;
    }
}

/// Sink that appends to its tap
pub struct MemorySink<O> {
    tap: SinkTap,
    finish: fn(&TapState) -> O,
    held: bool,
}

impl MemorySink<u64> {
    /// Resolves to the number of bytes written
    pub fn counting(tap: SinkTap) -> Self {
        Self {
            tap,
            finish: |state| state.written.len() as u64,
            held: false,
        }
    }
}

impl MemorySink<Locator> {
    /// Resolves to `memory://opal/<label>`
    pub fn locating(tap: SinkTap) -> Self {
        Self {
            tap,
            finish: |state| Locator::new(format!("memory://opal/{}", state.label)),
            held: false,
        }
    }
}

impl<O> ByteSink for MemorySink<O>
where
    O: Send + 'static,
{
    type Output = O;

    fn write(&mut self, chunk: Bytes) -> Result<Acceptance, SinkError> {
        let mut state = lock(&self.tap.state);
        let index = state.writes;
        state.writes += 1;

        if state.fail_on_write.is_some_and(|fail_at| index >= fail_at) {
            return Err(SinkError::provider(format!("write {} rejected", index)));
        }
        state.written.extend_from_slice(&chunk);

        if state.saturated {
            self.held = true;
            Ok(Acceptance::Saturated)
        } else {
            Ok(Acceptance::Accepted)
        }
    }

    async fn drained(&mut self) -> Result<(), SinkError> {
        if self.held {
            self.tap.drain.notified().await;
            self.held = false;
        }
        Ok(())
    }

    async fn end(self) -> Result<O, SinkError> {
        let mut state = lock(&self.tap.state);
        if state.fail_on_end {
            return Err(SinkError::provider("end rejected"));
        }
        state.ended = true;
        Ok((self.finish)(&state))
    }

    async fn abort(self) {
        lock(&self.tap.state).aborted = true;
    }
}

#[derive(Default)]
struct ScratchState {
    files: HashMap<PathBuf, SinkTap>,
    remove_calls: HashMap<PathBuf, usize>,
    size_override: Option<u64>,
    fail_create: bool,
    fail_write_on: Option<usize>,
}

/// Scratch store keeping files in memory
#[derive(Clone, Default)]
pub struct MemoryScratch {
    state: Arc<Mutex<ScratchState>>,
}

impl MemoryScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report this size for every file instead of the bytes written
    pub fn with_reported_size(self, size: u64) -> Self {
        lock(&self.state).size_override = Some(size);
        self
    }

    pub fn fail_create(&self) {
        lock(&self.state).fail_create = true;
    }

    pub fn fail_write_on(&self, index: usize) {
        lock(&self.state).fail_write_on = Some(index);
    }

    pub fn exists(&self, path: &Path) -> bool {
        lock(&self.state).files.contains_key(path)
    }

    pub fn created(&self) -> Vec<PathBuf> {
        lock(&self.state).files.keys().cloned().collect()
    }

    pub fn remove_calls(&self, path: &Path) -> usize {
        lock(&self.state).remove_calls.get(path).copied().unwrap_or(0)
    }

    pub fn tap(&self, path: &Path) -> Option<SinkTap> {
        lock(&self.state).files.get(path).cloned()
    }
}

impl ScratchStore for MemoryScratch {
    type Sink = MemorySink<u64>;

    fn scratch_path(&self, connection: &ConnectionId, name: &ObjectName) -> PathBuf {
        PathBuf::from("scratch").join(format!("{}_{}", connection, name))
    }

    async fn create(&self, path: &Path) -> Result<Self::Sink, SinkError> {
        let mut state = lock(&self.state);
        if state.fail_create {
            return Err(SinkError::io("disk full"));
        }
        let tap = SinkTap::labeled(path.display().to_string());
        if let Some(index) = state.fail_write_on {
            tap.fail_on_write(index);
        }
        state.files.insert(path.to_path_buf(), tap.clone());
        Ok(MemorySink::counting(tap))
    }

    async fn size(&self, path: &Path) -> Result<u64, SinkError> {
        let state = lock(&self.state);
        let tap = state
            .files
            .get(path)
            .ok_or_else(|| SinkError::io("no such file"))?;
        Ok(state
            .size_override
            .unwrap_or_else(|| tap.written().len() as u64))
    }

    async fn read(&self, path: &Path) -> Result<Bytes, SinkError> {
        let state = lock(&self.state);
        let tap = state
            .files
            .get(path)
            .ok_or_else(|| SinkError::io("no such file"))?;
        Ok(Bytes::from(tap.written()))
    }

    async fn remove(&self, path: &Path) -> Result<bool, SinkError> {
        let mut state = lock(&self.state);
        *state.remove_calls.entry(path.to_path_buf()).or_default() += 1;
        Ok(state.files.remove(path).is_some())
    }
}

#[derive(Default)]
struct RemoteState {
    opened: Vec<(String, SinkTap)>,
    fail_open: bool,
    fail_write_on: Option<usize>,
    fail_end: bool,
}

/// Remote store keeping uploads in memory
#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(&self) {
        lock(&self.state).fail_open = true;
    }

    pub fn fail_write_on(&self, index: usize) {
        lock(&self.state).fail_write_on = Some(index);
    }

    pub fn fail_end(&self) {
        lock(&self.state).fail_end = true;
    }

    pub fn tap(&self, name: &str) -> Option<SinkTap> {
        lock(&self.state)
            .opened
            .iter()
            .find(|(opened, _)| opened == name)
            .map(|(_, tap)| tap.clone())
    }

    pub fn opened(&self) -> usize {
        lock(&self.state).opened.len()
    }
}

impl RemoteStore for MemoryRemote {
    type Sink = MemorySink<Locator>;

    async fn open(&self, name: &ObjectName) -> Result<Self::Sink, SinkError> {
        let mut state = lock(&self.state);
        if state.fail_open {
            return Err(SinkError::provider("bucket unavailable"));
        }
        let tap = SinkTap::labeled(name.as_str());
        if let Some(index) = state.fail_write_on {
            tap.fail_on_write(index);
        }
        if state.fail_end {
            tap.fail_on_end();
        }
        state.opened.push((name.to_string(), tap.clone()));
        Ok(MemorySink::locating(tap))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRecord {
    ProcessingStarted {
        user: String,
        filename: String,
    },
    Transcribed {
        user: String,
        filename: String,
        content: StructuredContent,
        transcript: String,
    },
    Complete {
        user: String,
        filename: String,
    },
}

struct CatalogState {
    calls: Vec<CatalogRecord>,
    plan: PlanTier,
    processing_status: u16,
    transcribed_status: u16,
    complete_status: u16,
    unreachable: bool,
    transcribed_unreachable: bool,
    stall_processing: bool,
}

/// Catalog client that records every call
#[derive(Clone)]
pub struct RecordingCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl RecordingCatalog {
    pub fn new(plan: PlanTier) -> Self {
        Self {
            state: Arc::new(Mutex::new(CatalogState {
                calls: Vec::new(),
                plan,
                processing_status: CATALOG_OK,
                transcribed_status: CATALOG_OK,
                complete_status: CATALOG_OK,
                unreachable: false,
                transcribed_unreachable: false,
                stall_processing: false,
            })),
        }
    }

    pub fn with_processing_status(self, status: u16) -> Self {
        lock(&self.state).processing_status = status;
        self
    }

    pub fn with_complete_status(self, status: u16) -> Self {
        lock(&self.state).complete_status = status;
        self
    }

    pub fn with_transcribed_status(self, status: u16) -> Self {
        lock(&self.state).transcribed_status = status;
        self
    }

    /// Only the "transcribed" call fails to connect
    pub fn transcribed_unreachable(self) -> Self {
        lock(&self.state).transcribed_unreachable = true;
        self
    }

    /// "Processing started" is recorded and then never answers
    pub fn stall_processing(self) -> Self {
        lock(&self.state).stall_processing = true;
        self
    }

    pub fn unreachable(self) -> Self {
        lock(&self.state).unreachable = true;
        self
    }

    pub fn calls(&self) -> Vec<CatalogRecord> {
        lock(&self.state).calls.clone()
    }

    fn record(&self, record: CatalogRecord) -> Result<(), CatalogError> {
        let mut state = lock(&self.state);
        state.calls.push(record);
        if state.unreachable {
            return Err(CatalogError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

impl CatalogClient for RecordingCatalog {
    async fn processing_started(
        &self,
        user: &UserId,
        filename: &ObjectName,
    ) -> Result<ProcessingTicket, CatalogError> {
        self.record(CatalogRecord::ProcessingStarted {
            user: user.to_string(),
            filename: filename.to_string(),
        })?;
        let stall = lock(&self.state).stall_processing;
        if stall {
            std::future::pending::<()>().await;
        }
        let state = lock(&self.state);
        Ok(ProcessingTicket {
            status: state.processing_status,
            plan: state.plan,
        })
    }

    async fn transcribed(
        &self,
        user: &UserId,
        filename: &ObjectName,
        content: &StructuredContent,
        transcript: &str,
    ) -> Result<u16, CatalogError> {
        self.record(CatalogRecord::Transcribed {
            user: user.to_string(),
            filename: filename.to_string(),
            content: content.clone(),
            transcript: transcript.to_string(),
        })?;
        let state = lock(&self.state);
        if state.transcribed_unreachable {
            return Err(CatalogError::Transport("connection reset".to_string()));
        }
        Ok(state.transcribed_status)
    }

    async fn complete(&self, user: &UserId, filename: &ObjectName) -> Result<u16, CatalogError> {
        self.record(CatalogRecord::Complete {
            user: user.to_string(),
            filename: filename.to_string(),
        })?;
        Ok(lock(&self.state).complete_status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentCall {
    Transcribe { size: usize },
    Summarize,
}

/// Enrichment provider with canned answers; `None` makes the call fail
#[derive(Clone)]
pub struct ScriptedEnrichment {
    transcript: Option<String>,
    summary: Option<String>,
    calls: Arc<Mutex<Vec<EnrichmentCall>>>,
}

impl ScriptedEnrichment {
    pub fn new(transcript: Option<&str>, summary: Option<&str>) -> Self {
        Self {
            transcript: transcript.map(str::to_string),
            summary: summary.map(str::to_string),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<EnrichmentCall> {
        lock(&self.calls).clone()
    }
}

impl EnrichmentProvider for ScriptedEnrichment {
    async fn transcribe(&self, media: Bytes, _media_type: &str) -> Result<String, EnrichmentError> {
        lock(&self.calls).push(EnrichmentCall::Transcribe { size: media.len() });
        self.transcript.clone().ok_or(EnrichmentError::Api {
            status: 500,
            body: "transcription unavailable".to_string(),
        })
    }

    async fn summarize(&self, _transcript: &str) -> Result<String, EnrichmentError> {
        lock(&self.calls).push(EnrichmentCall::Summarize);
        self.summary
            .clone()
            .ok_or(EnrichmentError::Transport("timed out".to_string()))
    }
}
