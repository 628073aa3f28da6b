//! Enrichment Orchestrator
//!
//! Turns a finished media object into a transcript and a structured
//! `{title, summary}` document. Enrichment is strictly best effort: every
//! failure is logged and absorbed here, and a summary the provider produced
//! but that does not parse is replaced by a deterministic fallback.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    ingestion::error::{EnrichmentStage, IngestionError},
    ports::EnrichmentProvider,
};

/// Title used when the summary payload cannot be parsed
pub const FALLBACK_TITLE: &str = "AI Generated Title";

/// Number of transcript characters kept in a fallback summary
pub const FALLBACK_SUMMARY_CHARS: usize = 200;

/// Structured content attached to an object in the system-of-record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredContent {
    pub title: String,
    pub summary: String,
}

impl StructuredContent {
    /// Deterministic content derived from the transcript alone
    pub fn fallback(transcript: &str) -> Self {
        let head: String = transcript.chars().take(FALLBACK_SUMMARY_CHARS).collect();
        Self {
            title: FALLBACK_TITLE.to_string(),
            summary: format!("{}...", head),
        }
    }

    /// Parse the provider's free-form summary response
    ///
    /// Accepts a JSON object with `title` and `summary`, optionally wrapped in
    /// a fenced code block.
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::Parse` if the text is not such an object.
    pub fn parse(raw: &str) -> Result<Self, IngestionError> {
        serde_json::from_str(strip_code_fence(raw)).map_err(|err| IngestionError::Parse(err.to_string()))
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the language tag, e.g. ```json
    let body = body.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Output of one enrichment run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentResult {
    pub transcript: String,
    pub title: String,
    pub summary: String,
    /// `false` when the title and summary come from the fallback
    pub well_formed: bool,
}

impl EnrichmentResult {
    fn new(transcript: String, content: StructuredContent, well_formed: bool) -> Self {
        Self {
            transcript,
            title: content.title,
            summary: content.summary,
            well_formed,
        }
    }

    pub fn content(&self) -> StructuredContent {
        StructuredContent {
            title: self.title.clone(),
            summary: self.summary.clone(),
        }
    }
}

/// Runs transcription then summarization against an [`EnrichmentProvider`]
pub struct EnrichmentOrchestrator<E> {
    provider: Arc<E>,
}

impl<E> EnrichmentOrchestrator<E>
where
    E: EnrichmentProvider,
{
    pub fn new(provider: Arc<E>) -> Self {
        Self { provider }
    }

    /// Enrich a media object
    ///
    /// Returns `None` when there is nothing to attach: a provider call failed
    /// or the transcript came back empty. Never fails.
    pub async fn run(&self, media: Bytes, media_type: &str) -> Option<EnrichmentResult> {
        let media_size = media.len();

        let transcript = match self.provider.transcribe(media, media_type).await {
            Ok(transcript) => transcript,
            Err(err) => {
                let err = IngestionError::enrichment(EnrichmentStage::Transcription, err);
                warn!(error = %err, media_size = media_size, "Transcription failed, skipping enrichment");
                return None;
            }
        };

        if transcript.trim().is_empty() {
            info!(media_size = media_size, "Empty transcript, skipping summary");
            return None;
        }

        let raw_summary = match self.provider.summarize(&transcript).await {
            Ok(raw) => raw,
            Err(err) => {
                let err = IngestionError::enrichment(EnrichmentStage::Summary, err);
                warn!(error = %err, "Summary failed, skipping enrichment");
                return None;
            }
        };

        let result = match StructuredContent::parse(&raw_summary) {
            Ok(content) => EnrichmentResult::new(transcript, content, true),
            Err(err) => {
                warn!(error = %err, "Summary payload malformed, using fallback content");
                let content = StructuredContent::fallback(&transcript);
                EnrichmentResult::new(transcript, content, false)
            }
        };

        info!(
            transcript_chars = result.transcript.chars().count(),
            well_formed = result.well_formed,
            "Enrichment complete"
        );

        Some(result)
    }
}
