//! Session cleanup and abort
//!
//! Both helpers are idempotent so they can run unconditionally at the end of
//! every workflow: sinks that were already ended or aborted are gone from the
//! session, and the scratch file is claimed before it is deleted.

use tracing::{debug, info, warn};

use crate::{
    ingestion::entity::TransferSession,
    ports::{ByteSink, ScratchStore},
};

/// Destroy a session's resources
///
/// Aborts any sink still held (unflushed data is discarded and completion is
/// not awaited) and deletes the scratch file. Callable from any state.
/// Registry removal is left to the session worker that owns the session.
pub async fn abort<L, R, S>(session: &mut TransferSession<L, R>, scratch: &S, reason: &str)
where
    L: ByteSink,
    R: ByteSink,
    S: ScratchStore,
{
    if session.has_sinks() {
        info!(
            session_id = %session.id(),
            name = %session.name(),
            state = %session.state(),
            reason = reason,
            "Aborting session sinks"
        );
    }

    let (local, remote) = session.take_sinks();
    let abort_local = async {
        if let Some(local) = local {
            local.abort().await;
        }
    };
    let abort_remote = async {
        if let Some(remote) = remote {
            remote.abort().await;
        }
    };
    tokio::join!(abort_local, abort_remote);

    release_scratch(session, scratch).await;
}

/// Delete the session's scratch file, at most once per session
///
/// An already-absent file counts as deleted. A failed deletion is logged and
/// not retried. Returns whether this call performed the release.
pub async fn release_scratch<L, R, S>(session: &mut TransferSession<L, R>, scratch: &S) -> bool
where
    S: ScratchStore,
{
    if !session.claim_scratch_release() {
        return false;
    }

    match scratch.remove(session.scratch_path()).await {
        Ok(true) => debug!(
            session_id = %session.id(),
            path = %session.scratch_path().display(),
            "Scratch file deleted"
        ),
        Ok(false) => debug!(
            session_id = %session.id(),
            path = %session.scratch_path().display(),
            "Scratch file already absent"
        ),
        Err(err) => warn!(
            session_id = %session.id(),
            path = %session.scratch_path().display(),
            error = %err,
            "Failed to delete scratch file"
        ),
    }
    true
}
