//! # VidRelay Domain Layer
//!
//! This crate contains the pure business logic and domain models for the
//! VidRelay media relay. It follows hexagonal architecture principles:
//!
//! - **Entities**: Core domain models (TransferSession, SessionState)
//! - **Ports**: Trait definitions for external dependencies (ByteSink,
//!   ScratchStore, RemoteStore, CatalogClient, EnrichmentProvider)
//! - **Services**: Business logic orchestration (RelayService, Finalizer)
//!
//! ## Architecture
//!
//! This layer has NO dependencies on infrastructure concerns (AWS, S3, HTTP, etc.).
//! All external dependencies are expressed as traits (ports) that are implemented
//! by adapter crates.
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use vidrelay_domain::ingestion::{ConnectionId, EventSender, RelayService, UserId};
//! use vidrelay_domain::ports::{CatalogClient, EnrichmentProvider, RemoteStore, ScratchStore};
//!
//! // The service is generic over every port implementation
//! async fn example<S, R, C, E>(service: RelayService<S, R, C, E>, events: EventSender)
//! where
//!     S: ScratchStore,
//!     R: RemoteStore,
//!     C: CatalogClient,
//!     E: EnrichmentProvider,
//! {
//!     let connection = ConnectionId::new();
//!     service
//!         .fragment(connection, &events, "demo.webm", Bytes::from_static(b"..."), 0)
//!         .unwrap();
//!     service
//!         .finalize(connection, "demo.webm", UserId::new("42"))
//!         .unwrap();
//! }
//! ```

pub mod channel_sink;
pub mod ingestion;
pub mod ports;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use channel_sink::ChannelSink;
pub use ingestion::{ClientEvent, ConnectionId, IngestionError, ObjectName, RelayService, UserId};
pub use ports::{ByteSink, Locator};
