use std::future::Future;

use bytes::Bytes;

use crate::ingestion::EnrichmentError;

/// Port for the enrichment provider
///
/// The provider is a model host; the domain only relies on the shape of its
/// two calls. Parsing the summary is the orchestrator's job, so `summarize`
/// returns the provider's free-form text untouched.
pub trait EnrichmentProvider: Send + Sync + 'static {
    /// Transcribe a media object to plain text
    fn transcribe(
        &self,
        media: Bytes,
        media_type: &str,
    ) -> impl Future<Output = Result<String, EnrichmentError>> + Send;

    /// Ask for a `{title, summary}` document describing the transcript
    fn summarize(&self, transcript: &str) -> impl Future<Output = Result<String, EnrichmentError>> + Send;
}
