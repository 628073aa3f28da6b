//! HTTP Catalog Client Implementation
//!
//! This module implements the `CatalogClient` port against the system-of-record's
//! REST API. Every call is a JSON `POST` under `recording/{userId}/`, and the
//! status that counts is the `status` field of the response body.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use vidrelay_domain::{
    ingestion::{CatalogError, ObjectName, StructuredContent, UserId},
    ports::{CatalogClient, PlanTier, ProcessingTicket},
};

/// Default request timeout for system-of-record calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest-based implementation of the CatalogClient port
#[derive(Clone)]
pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogClient {
    /// Create a client for the API rooted at `base_url`
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CatalogError::Transport(format!("cannot build HTTP client: {}", err)))?;

        let base_url = format!("{}/", base_url.trim_end_matches('/'));
        info!(base_url = %base_url, timeout_secs = timeout.as_secs(), "Initializing HttpCatalogClient");

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}recording/{userId}/{action}`
    fn endpoint(&self, user: &UserId, action: &str) -> String {
        format!("{}recording/{}/{}", self.base_url, user, action)
    }

    /// POST a JSON body and return the HTTP status with the raw response body
    async fn post<B>(&self, url: &str, body: &B) -> Result<(u16, String), CatalogError>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                error!(url = %url, error = %err, "Catalog request failed");
                if err.is_timeout() {
                    CatalogError::Transport(format!("request to '{}' timed out", url))
                } else {
                    CatalogError::Transport(err.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| CatalogError::Transport(format!("cannot read response body: {}", err)))?;

        debug!(url = %url, http_status = status, "Catalog responded");
        Ok((status, text))
    }
}

#[derive(Serialize)]
struct FilenameBody<'a> {
    filename: &'a str,
}

#[derive(Serialize)]
struct TranscribedBody<'a> {
    filename: &'a str,
    /// `{title, summary}` encoded as JSON text
    content: String,
    transcript: &'a str,
}

#[derive(Deserialize)]
struct StatusBody {
    status: u16,
}

/// Interpret a "processing started" response
///
/// An HTTP-level failure counts as that status with the free tier.
fn parse_processing_ticket(http_status: u16, body: &str) -> Result<ProcessingTicket, CatalogError> {
    if !(200..300).contains(&http_status) {
        return Ok(ProcessingTicket {
            status: http_status,
            plan: PlanTier::Free,
        });
    }
    serde_json::from_str(body).map_err(|err| CatalogError::Parse(err.to_string()))
}

/// Interpret a "transcribed" or "complete" response
fn parse_status(http_status: u16, body: &str) -> Result<u16, CatalogError> {
    if !(200..300).contains(&http_status) {
        return Ok(http_status);
    }
    serde_json::from_str::<StatusBody>(body)
        .map(|parsed| parsed.status)
        .map_err(|err| CatalogError::Parse(err.to_string()))
}

impl CatalogClient for HttpCatalogClient {
    #[instrument(skip(self, user, filename), fields(user_id = %user, filename = %filename))]
    fn processing_started(
        &self,
        user: &UserId,
        filename: &ObjectName,
    ) -> impl std::future::Future<Output = Result<ProcessingTicket, CatalogError>> + Send {
        let url = self.endpoint(user, "processing");
        let filename = filename.to_string();

        async move {
            let (http_status, body) = self.post(&url, &FilenameBody { filename: &filename }).await?;
            let ticket = parse_processing_ticket(http_status, &body)?;
            info!(status = ticket.status, plan = ?ticket.plan, "Processing started");
            Ok(ticket)
        }
    }

    #[instrument(skip_all, fields(user_id = %user, filename = %filename))]
    fn transcribed(
        &self,
        user: &UserId,
        filename: &ObjectName,
        content: &StructuredContent,
        transcript: &str,
    ) -> impl std::future::Future<Output = Result<u16, CatalogError>> + Send {
        let url = self.endpoint(user, "transcribe");
        let filename = filename.to_string();
        let content = serde_json::to_string(content);
        let transcript = transcript.to_string();

        async move {
            let content = content.map_err(|err| CatalogError::Parse(err.to_string()))?;
            let body = TranscribedBody {
                filename: &filename,
                content,
                transcript: &transcript,
            };
            let (http_status, body) = self.post(&url, &body).await?;
            let status = parse_status(http_status, &body)?;
            if status != vidrelay_domain::ports::CATALOG_OK {
                warn!(status = status, "Transcript not accepted");
            }
            Ok(status)
        }
    }

    #[instrument(skip(self, user, filename), fields(user_id = %user, filename = %filename))]
    fn complete(
        &self,
        user: &UserId,
        filename: &ObjectName,
    ) -> impl std::future::Future<Output = Result<u16, CatalogError>> + Send {
        let url = self.endpoint(user, "complete");
        let filename = filename.to_string();

        async move {
            let (http_status, body) = self.post(&url, &FilenameBody { filename: &filename }).await?;
            let status = parse_status(http_status, &body)?;
            info!(status = status, "Processing completion reported");
            Ok(status)
        }
    }
}
