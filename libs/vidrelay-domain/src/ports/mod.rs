//! Ports (trait definitions) for external dependencies
//!
//! This module defines the contracts (ports) that external adapters must implement.
//! Following hexagonal architecture, the domain defines what it needs, and the
//! infrastructure provides implementations:
//!
//! - [`ByteSink`]: an incremental byte destination with backpressure
//! - [`ScratchStore`]: the local scratch directory (Local Sink factory)
//! - [`RemoteStore`]: the remote object store (Remote Sink factory)
//! - [`CatalogClient`]: the external system-of-record
//! - [`EnrichmentProvider`]: transcription and summarization
//!
//! ## Static Dispatch
//!
//! We use native Rust async traits with `impl Future` return types instead of
//! `async_trait` to ensure zero-cost abstractions and static dispatch.

mod catalog;
mod enrichment;
mod sink;
mod storage;

pub use catalog::{CatalogClient, PlanTier, ProcessingTicket, CATALOG_OK};
pub use enrichment::EnrichmentProvider;
pub use sink::{Acceptance, ByteSink};
pub use storage::{Locator, RemoteStore, ScratchStore};
