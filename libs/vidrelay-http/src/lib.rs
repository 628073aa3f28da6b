//! # VidRelay HTTP Adapters
//!
//! reqwest-based implementations of two domain ports:
//!
//! - [`HttpCatalogClient`]: the external system-of-record (`CatalogClient`)
//! - [`OpenAiEnrichmentProvider`]: transcription and summarization through an
//!   OpenAI-compatible API (`EnrichmentProvider`)

pub mod infrastructure;

pub use infrastructure::{HttpCatalogClient, OpenAiConfig, OpenAiEnrichmentProvider};
