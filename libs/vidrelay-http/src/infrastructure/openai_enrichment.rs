//! OpenAI-compatible Enrichment Provider
//!
//! Implements the `EnrichmentProvider` port with two endpoints of an
//! OpenAI-compatible API: audio transcription (multipart upload of the media
//! object) and chat completion (summary as JSON text). The chat response is
//! returned verbatim; parsing it is up to the domain.

use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};
use vidrelay_domain::{ingestion::EnrichmentError, ports::EnrichmentProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const DEFAULT_SUMMARY_MODEL: &str = "gpt-4o-mini";

const SUMMARY_PROMPT: &str = "You generate titles and summaries for screen recordings. \
Given the transcript of a recording, reply with a JSON object of the form \
{\"title\": string, \"summary\": string}. The title is at most 8 words. \
The summary is 2 to 4 sentences. Reply with the JSON object only.";

/// Configuration for the OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Enrichment is disabled when no key is configured
    pub api_key: Option<String>,
    pub base_url: String,
    pub transcription_model: String,
    pub summary_model: String,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            summary_model: DEFAULT_SUMMARY_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// reqwest-based implementation of the EnrichmentProvider port
#[derive(Clone)]
pub struct OpenAiEnrichmentProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiEnrichmentProvider {
    /// # Errors
    ///
    /// Returns `EnrichmentError::Transport` if the HTTP client cannot be built.
    pub fn new(mut config: OpenAiConfig) -> Result<Self, EnrichmentError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| EnrichmentError::Transport(format!("cannot build HTTP client: {}", err)))?;

        config.base_url = config.base_url.trim_end_matches('/').to_string();
        info!(
            base_url = %config.base_url,
            enabled = config.api_key.is_some(),
            transcription_model = %config.transcription_model,
            summary_model = %config.summary_model,
            "Initializing OpenAiEnrichmentProvider"
        );

        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, EnrichmentError> {
        self.config
            .api_key
            .as_deref()
            .ok_or(EnrichmentError::NotConfigured)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    /// Send a request and return the body of a successful response
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<String, EnrichmentError> {
        let response = request.send().await.map_err(|err| {
            error!(error = %err, "Enrichment request failed");
            if err.is_timeout() {
                EnrichmentError::Transport(format!(
                    "request timed out after {}s",
                    self.config.timeout.as_secs()
                ))
            } else {
                EnrichmentError::Transport(err.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| EnrichmentError::Transport(format!("cannot read response body: {}", err)))?;

        if !status.is_success() {
            return Err(EnrichmentError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

fn parse_transcription(body: &str) -> Result<String, EnrichmentError> {
    serde_json::from_str::<TranscriptionResponse>(body)
        .map(|parsed| parsed.text)
        .map_err(|err| EnrichmentError::Parse(err.to_string()))
}

fn parse_chat_completion(body: &str) -> Result<String, EnrichmentError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|err| EnrichmentError::Parse(err.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| EnrichmentError::Parse("completion has no message content".to_string()))
}

/// `video/webm` -> `recording.webm`
fn upload_file_name(media_type: &str) -> String {
    let extension = media_type
        .rsplit('/')
        .next()
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin");
    format!("recording.{}", extension)
}

impl EnrichmentProvider for OpenAiEnrichmentProvider {
    #[instrument(skip(self, media), fields(media_size = media.len()))]
    fn transcribe(
        &self,
        media: Bytes,
        media_type: &str,
    ) -> impl std::future::Future<Output = Result<String, EnrichmentError>> + Send {
        let media_type = media_type.to_string();

        async move {
            let api_key = self.api_key()?;
            let size = media.len() as u64;

            let file = Part::stream_with_length(reqwest::Body::from(media), size)
                .file_name(upload_file_name(&media_type))
                .mime_str(&media_type)
                .map_err(|err| EnrichmentError::Transport(format!("invalid media type: {}", err)))?;
            let form = Form::new()
                .part("file", file)
                .text("model", self.config.transcription_model.clone());

            let request = self
                .client
                .post(self.url("audio/transcriptions"))
                .bearer_auth(api_key)
                .multipart(form);

            let transcript = parse_transcription(&self.execute(request).await?)?;
            debug!(transcript_chars = transcript.chars().count(), "Transcription received");
            Ok(transcript)
        }
    }

    #[instrument(skip_all, fields(transcript_chars = transcript.chars().count()))]
    fn summarize(
        &self,
        transcript: &str,
    ) -> impl std::future::Future<Output = Result<String, EnrichmentError>> + Send {
        let transcript = transcript.to_string();

        async move {
            let api_key = self.api_key()?;
            let body = ChatRequest {
                model: &self.config.summary_model,
                messages: [
                    ChatMessage {
                        role: "system",
                        content: SUMMARY_PROMPT,
                    },
                    ChatMessage {
                        role: "user",
                        content: &transcript,
                    },
                ],
            };

            let request = self
                .client
                .post(self.url("chat/completions"))
                .bearer_auth(api_key)
                .json(&body);

            let summary = parse_chat_completion(&self.execute(request).await?)?;
            debug!(summary_chars = summary.chars().count(), "Summary received");
            Ok(summary)
        }
    }
}
