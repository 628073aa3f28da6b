//! Finalizer
//!
//! Drives a Transfer Session from `STREAMING` to a terminal state once the
//! client has sent its last fragment:
//!
//! 1. `FINALIZING`: end both sinks and await the remote locator
//! 2. notify the system-of-record that processing started
//! 3. `ENRICHING` (premium tier and small enough objects only)
//! 4. `NOTIFYING`: attach enrichment output, then mark the object complete
//! 5. cleanup, then `DONE` or `FAILED`
//!
//! Cleanup runs on every exit path.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    ingestion::{
        cleanup,
        enrichment::{EnrichmentOrchestrator, EnrichmentResult},
        entity::{SessionState, TransferSession},
        error::{CatalogCall, CatalogError, IngestionError, SinkKind},
        ids::UserId,
    },
    ports::{
        ByteSink, CatalogClient, EnrichmentProvider, Locator, PlanTier, ScratchStore, CATALOG_OK,
    },
};

/// Objects at or above this size are never enriched (25 MiB)
pub const DEFAULT_ENRICHMENT_MAX_BYTES: u64 = 25 * 1024 * 1024;

/// Media type handed to the transcription provider
pub const DEFAULT_MEDIA_TYPE: &str = "video/webm";

/// Configuration for the Finalizer
#[derive(Debug, Clone)]
pub struct FinalizerConfig {
    /// Exclusive upper bound on the scratch file size for enrichment
    pub enrichment_max_bytes: u64,
    /// Media type of uploaded objects
    pub media_type: String,
}

impl Default for FinalizerConfig {
    fn default() -> Self {
        Self {
            enrichment_max_bytes: DEFAULT_ENRICHMENT_MAX_BYTES,
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
        }
    }
}

/// Result of a successful finalize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub locator: Locator,
    pub bytes: u64,
    pub enriched: bool,
}

pub struct Finalizer<S, C, E> {
    scratch: Arc<S>,
    catalog: Arc<C>,
    enrichment: EnrichmentOrchestrator<E>,
    config: FinalizerConfig,
}

impl<S, C, E> Finalizer<S, C, E>
where
    S: ScratchStore,
    C: CatalogClient,
    E: EnrichmentProvider,
{
    pub fn new(scratch: Arc<S>, catalog: Arc<C>, enrichment: Arc<E>, config: FinalizerConfig) -> Self {
        Self {
            scratch,
            catalog,
            enrichment: EnrichmentOrchestrator::new(enrichment),
            config,
        }
    }

    pub fn config(&self) -> &FinalizerConfig {
        &self.config
    }

    /// Finalize a streaming session
    ///
    /// The session ends in `DONE` on success and `FAILED` otherwise; either
    /// way its sinks are released and its scratch file deleted before this
    /// returns.
    ///
    /// # Errors
    ///
    /// - `IngestionError::Finalize` if either sink failed to complete
    /// - `IngestionError::Catalog` if "processing started" or "complete" was
    ///   rejected
    /// - `IngestionError::InvalidTransition` if the session was not streaming
    pub async fn finalize<L, R>(
        &self,
        session: &mut TransferSession<L, R>,
        user: &UserId,
    ) -> Result<FinalizeOutcome, IngestionError>
    where
        L: ByteSink<Output = u64>,
        R: ByteSink<Output = Locator>,
    {
        let result = self.run(session, user).await;

        let reason = match &result {
            Ok(_) => "finalized",
            Err(_) => {
                session.fail();
                "finalize failed"
            }
        };
        cleanup::abort(session, &*self.scratch, reason).await;

        match result {
            Ok(outcome) => {
                session.transition(SessionState::Done)?;
                info!(
                    session_id = %session.id(),
                    name = %session.name(),
                    locator = %outcome.locator,
                    bytes = outcome.bytes,
                    enriched = outcome.enriched,
                    "Session finalized"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(
                    session_id = %session.id(),
                    name = %session.name(),
                    error = %err,
                    "Session finalize failed"
                );
                Err(err)
            }
        }
    }

    async fn run<L, R>(
        &self,
        session: &mut TransferSession<L, R>,
        user: &UserId,
    ) -> Result<FinalizeOutcome, IngestionError>
    where
        L: ByteSink<Output = u64>,
        R: ByteSink<Output = Locator>,
    {
        session.transition(SessionState::Finalizing)?;
        let (bytes, locator) = end_sinks(session).await?;

        info!(
            session_id = %session.id(),
            name = %session.name(),
            bytes = bytes,
            locator = %locator,
            "Both sinks completed"
        );

        let ticket = self
            .catalog
            .processing_started(user, session.name())
            .await
            .map_err(|err| IngestionError::catalog(CatalogCall::Processing, err))?;
        if !ticket.is_success() {
            return Err(IngestionError::catalog(
                CatalogCall::Processing,
                CatalogError::Rejected {
                    status: ticket.status,
                },
            ));
        }

        let enrichment = if self.should_enrich(ticket.plan, session).await {
            session.transition(SessionState::Enriching)?;
            self.enrich(session).await
        } else {
            None
        };

        session.transition(SessionState::Notifying)?;

        if let Some(result) = &enrichment {
            self.notify_transcribed(session, user, result).await;
        }

        let status = self
            .catalog
            .complete(user, session.name())
            .await
            .map_err(|err| IngestionError::catalog(CatalogCall::Complete, err))?;
        if status != CATALOG_OK {
            return Err(IngestionError::catalog(
                CatalogCall::Complete,
                CatalogError::Rejected { status },
            ));
        }

        Ok(FinalizeOutcome {
            locator,
            bytes,
            enriched: enrichment.is_some(),
        })
    }

    /// Premium tier and a scratch file strictly below the size threshold
    async fn should_enrich<L, R>(&self, plan: PlanTier, session: &TransferSession<L, R>) -> bool {
        if !plan.is_premium() {
            return false;
        }

        match self.scratch.size(session.scratch_path()).await {
            Ok(size) if size < self.config.enrichment_max_bytes => true,
            Ok(size) => {
                info!(
                    session_id = %session.id(),
                    size = size,
                    max = self.config.enrichment_max_bytes,
                    "Object too large for enrichment"
                );
                false
            }
            Err(err) => {
                warn!(session_id = %session.id(), error = %err, "Cannot size scratch file, skipping enrichment");
                false
            }
        }
    }

    async fn enrich<L, R>(&self, session: &TransferSession<L, R>) -> Option<EnrichmentResult> {
        let media = match self.scratch.read(session.scratch_path()).await {
            Ok(media) => media,
            Err(err) => {
                warn!(session_id = %session.id(), error = %err, "Cannot read scratch file, skipping enrichment");
                return None;
            }
        };

        self.enrichment.run(media, &self.config.media_type).await
    }

    /// Best effort: failures are logged only
    async fn notify_transcribed<L, R>(
        &self,
        session: &TransferSession<L, R>,
        user: &UserId,
        result: &EnrichmentResult,
    ) {
        match self
            .catalog
            .transcribed(user, session.name(), &result.content(), &result.transcript)
            .await
        {
            Ok(CATALOG_OK) => info!(session_id = %session.id(), "Transcript attached"),
            Ok(status) => warn!(session_id = %session.id(), status = status, "Transcript rejected by catalog"),
            Err(err) => warn!(session_id = %session.id(), error = %err, "Failed to attach transcript"),
        }
    }
}

/// End both sinks concurrently; no more writes are possible afterwards
async fn end_sinks<L, R>(session: &mut TransferSession<L, R>) -> Result<(u64, Locator), IngestionError>
where
    L: ByteSink<Output = u64>,
    R: ByteSink<Output = Locator>,
{
    let (local, remote) = match session.take_sinks() {
        (Some(local), Some(remote)) => (local, remote),
        (local, remote) => {
            if let Some(local) = local {
                local.abort().await;
            }
            if let Some(remote) = remote {
                remote.abort().await;
            }
            return Err(IngestionError::internal_error("session sinks already released"));
        }
    };

    let (local_result, remote_result) = tokio::join!(local.end(), remote.end());

    let bytes = local_result.map_err(|err| IngestionError::finalize(SinkKind::Local, err))?;
    let locator = remote_result.map_err(|err| IngestionError::finalize(SinkKind::Remote, err))?;
    Ok((bytes, locator))
}
