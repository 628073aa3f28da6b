//! Flow Controller
//!
//! Replicates each fragment of a session to both of its sinks and decides
//! when the fragment may be acknowledged. A fragment is acknowledged only
//! after both sinks have accepted it, either immediately or after draining,
//! so the sender's outstanding-fragment budget bounds buffered memory.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::{
    ingestion::{
        entity::TransferSession,
        error::{IngestionError, SinkKind},
        events::{emit, ClientEvent, EventSender},
    },
    ports::{Acceptance, ByteSink},
};

/// Result of a fully accepted fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentReceipt {
    pub seq: u64,
    pub bytes_accepted: u64,
}

/// Per-session fragment distributor
pub struct FlowController {
    events: EventSender,
}

impl FlowController {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    /// Push one fragment to both sinks and acknowledge it
    ///
    /// Emits `progress` then `ack` once both sinks hold the fragment. The
    /// caller must not start the next fragment before this returns; that is
    /// what keeps acknowledgments in receive order.
    ///
    /// # Errors
    ///
    /// - `IngestionError::SessionNotFound` if the session is no longer streaming
    /// - `IngestionError::SinkWrite` if a sink failed outright; the session is
    ///   marked `FAILED` and the caller must abort it
    pub async fn ingest<L, R>(
        &self,
        session: &mut TransferSession<L, R>,
        chunk: Bytes,
        seq: u64,
    ) -> Result<FragmentReceipt, IngestionError>
    where
        L: ByteSink,
        R: ByteSink,
    {
        if !session.is_streaming() {
            return Err(IngestionError::session_not_found(session.name().as_str()));
        }

        let len = chunk.len() as u64;
        let result = match session.sinks_mut() {
            Some((local, remote)) => replicate(local, remote, chunk, seq).await,
            None => Err(IngestionError::session_not_found(session.name().as_str())),
        };

        if let Err(err) = result {
            warn!(
                session_id = %session.id(),
                name = %session.name(),
                seq = seq,
                error = %err,
                "Fragment rejected, failing session"
            );
            session.fail();
            return Err(err);
        }

        session.record_accepted(len, seq);
        let bytes_accepted = session.bytes_accepted();

        emit(
            &self.events,
            ClientEvent::Progress {
                name: session.name().to_string(),
                bytes_accepted,
            },
        );
        emit(&self.events, ClientEvent::Ack { seq });

        debug!(
            session_id = %session.id(),
            seq = seq,
            fragment_size = len,
            bytes_accepted = bytes_accepted,
            "Fragment acknowledged"
        );

        Ok(FragmentReceipt {
            seq,
            bytes_accepted,
        })
    }
}

/// Write to both sinks, then wait for whichever of them saturated
async fn replicate<L, R>(
    local: &mut L,
    remote: &mut R,
    chunk: Bytes,
    seq: u64,
) -> Result<(), IngestionError>
where
    L: ByteSink,
    R: ByteSink,
{
    let local_acceptance = local
        .write(chunk.clone())
        .map_err(|err| IngestionError::sink_write(SinkKind::Local, err))?;
    let remote_acceptance = remote
        .write(chunk)
        .map_err(|err| IngestionError::sink_write(SinkKind::Remote, err))?;

    let local_drain = async {
        if local_acceptance == Acceptance::Saturated {
            debug!(seq = seq, "Local sink saturated, waiting for drain");
            local
                .drained()
                .await
                .map_err(|err| IngestionError::sink_write(SinkKind::Local, err))?;
        }
        Ok::<(), IngestionError>(())
    };
    let remote_drain = async {
        if remote_acceptance == Acceptance::Saturated {
            debug!(seq = seq, "Remote sink saturated, waiting for drain");
            remote
                .drained()
                .await
                .map_err(|err| IngestionError::sink_write(SinkKind::Remote, err))?;
        }
        Ok::<(), IngestionError>(())
    };

    tokio::try_join!(local_drain, remote_drain)?;
    Ok(())
}
