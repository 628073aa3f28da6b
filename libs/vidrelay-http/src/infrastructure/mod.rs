//! HTTP adapters for the system-of-record and the enrichment provider

mod catalog_client;
mod openai_enrichment;

pub use catalog_client::{HttpCatalogClient, DEFAULT_TIMEOUT};
pub use openai_enrichment::{
    OpenAiConfig, OpenAiEnrichmentProvider, DEFAULT_BASE_URL, DEFAULT_SUMMARY_MODEL,
    DEFAULT_TRANSCRIPTION_MODEL,
};
