//! Ingestion domain module
//!
//! This module contains the core business logic for relaying a streamed media
//! object: the Transfer Session and its state machine, the Session Registry,
//! the Flow Controller, the Finalizer with its Enrichment Orchestrator, and the
//! per-session worker tying them together.

pub mod cleanup;
mod enrichment;
mod entity;
mod error;
mod events;
mod finalizer;
mod flow;
mod ids;
mod registry;
mod service;
mod worker;

pub use enrichment::{
    EnrichmentOrchestrator, EnrichmentResult, StructuredContent, FALLBACK_SUMMARY_CHARS,
    FALLBACK_TITLE,
};
pub use entity::{SessionState, TransferSession};
pub use error::{
    CatalogCall, CatalogError, EnrichmentError, EnrichmentStage, IngestionError, Result,
    SinkError, SinkKind,
};
pub use events::{emit, ClientEvent, EventSender};
pub use finalizer::{
    FinalizeOutcome, Finalizer, FinalizerConfig, DEFAULT_ENRICHMENT_MAX_BYTES, DEFAULT_MEDIA_TYPE,
};
pub use flow::{FlowController, FragmentReceipt};
pub use ids::{ConnectionId, ObjectName, SessionId, UserId, MAX_OBJECT_NAME_LEN};
pub use registry::{SessionHandle, SessionRegistry};
pub use service::{RelayService, SessionConfig, DEFAULT_MAX_IN_FLIGHT_FRAGMENTS};
