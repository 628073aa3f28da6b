//! Session worker
//!
//! One task per Transfer Session. The worker opens both sinks, then processes
//! the session's commands strictly one at a time, which is what keeps
//! acknowledgments in receive order. Every suspension point is raced against
//! the session's cancel signal. Whatever way the loop ends, the worker aborts
//! leftover resources and removes its own registry entry.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::{
    ingestion::{
        cleanup,
        entity::TransferSession,
        error::{IngestionError, SinkKind},
        events::{emit, ClientEvent, EventSender},
        finalizer::{FinalizeOutcome, Finalizer},
        flow::FlowController,
        ids::{ConnectionId, ObjectName, SessionId},
        registry::{SessionCommand, SessionInbox, SessionRegistry},
    },
    ports::{ByteSink, CatalogClient, EnrichmentProvider, RemoteStore, ScratchStore},
};

/// How the command loop ended
enum Exit {
    Finalized(Result<FinalizeOutcome, IngestionError>),
    Failed(IngestionError),
    Cancelled,
}

/// Everything a worker needs, moved into its task
pub(crate) struct SessionWorker<S, R, C, E> {
    pub(crate) id: SessionId,
    pub(crate) connection: ConnectionId,
    pub(crate) name: ObjectName,
    pub(crate) scratch: Arc<S>,
    pub(crate) remote: Arc<R>,
    pub(crate) finalizer: Arc<Finalizer<S, C, E>>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) events: EventSender,
    pub(crate) inbox: SessionInbox,
    pub(crate) cancel: Arc<Notify>,
    /// Dropped when the worker stops, which releases `SessionHandle::finished`
    pub(crate) finished: watch::Sender<()>,
}

impl<S, R, C, E> SessionWorker<S, R, C, E>
where
    S: ScratchStore,
    R: RemoteStore,
    C: CatalogClient,
    E: EnrichmentProvider,
{
    pub(crate) async fn run(mut self) {
        let opened = tokio::select! {
            biased;
            _ = self.cancel.notified() => None,
            opened = self.open() => Some(opened),
        };

        let mut session = match opened {
            Some(Ok(session)) => session,
            Some(Err(err)) => {
                warn!(
                    session_id = %self.id,
                    connection_id = %self.connection,
                    name = %self.name,
                    error = %err,
                    "Failed to open session sinks"
                );
                emit(&self.events, ClientEvent::upload_error(err.user_message()));
                self.discard_scratch().await;
                self.deregister();
                return;
            }
            None => {
                debug!(session_id = %self.id, "Session cancelled while opening");
                self.discard_scratch().await;
                self.deregister();
                return;
            }
        };

        info!(
            session_id = %self.id,
            connection_id = %self.connection,
            name = %self.name,
            scratch_path = %session.scratch_path().display(),
            "Session started"
        );

        let exit = self.drive(&mut session).await;

        let reason = match exit {
            Exit::Finalized(Ok(outcome)) => {
                emit(
                    &self.events,
                    ClientEvent::Finalized {
                        name: self.name.to_string(),
                        locator: outcome.locator.to_string(),
                    },
                );
                "finalized"
            }
            Exit::Finalized(Err(err)) | Exit::Failed(err) => {
                session.fail();
                emit(&self.events, ClientEvent::upload_error(err.user_message()));
                "failed"
            }
            Exit::Cancelled => {
                session.fail();
                "cancelled"
            }
        };

        cleanup::abort(&mut session, &*self.scratch, reason).await;
        self.deregister();

        debug!(
            session_id = %self.id,
            state = %session.state(),
            bytes_accepted = session.bytes_accepted(),
            lifetime_ms = (Utc::now() - *session.created_at()).num_milliseconds(),
            reason = reason,
            "Session worker stopped"
        );
    }

    /// Open the Local Sink, then the Remote Sink
    ///
    /// If the remote sink cannot be opened the local one is aborted before
    /// returning, so a failed open holds nothing.
    async fn open(&self) -> Result<TransferSession<S::Sink, R::Sink>, IngestionError> {
        let path = self.scratch.scratch_path(&self.connection, &self.name);

        let local = self
            .scratch
            .create(&path)
            .await
            .map_err(|source| IngestionError::SinkOpen {
                sink: SinkKind::Local,
                source,
            })?;

        let remote = match self.remote.open(&self.name).await {
            Ok(remote) => remote,
            Err(source) => {
                local.abort().await;
                return Err(IngestionError::SinkOpen {
                    sink: SinkKind::Remote,
                    source,
                });
            }
        };

        Ok(TransferSession::new(
            self.id,
            self.connection,
            self.name.clone(),
            path,
            local,
            remote,
        ))
    }

    async fn drive(&mut self, session: &mut TransferSession<S::Sink, R::Sink>) -> Exit {
        let flow = FlowController::new(self.events.clone());

        loop {
            let command = tokio::select! {
                biased;
                _ = self.cancel.notified() => return Exit::Cancelled,
                command = self.inbox.recv() => command,
            };

            match command {
                Some(SessionCommand::Fragment { chunk, seq }) => {
                    let result = tokio::select! {
                        biased;
                        _ = self.cancel.notified() => return Exit::Cancelled,
                        result = flow.ingest(session, chunk, seq) => result,
                    };
                    if let Err(err) = result {
                        return Exit::Failed(err);
                    }
                }
                Some(SessionCommand::Finalize { user }) => {
                    // Fragments sent after finalize are refused at the handle
                    self.inbox.close();
                    let result = tokio::select! {
                        biased;
                        _ = self.cancel.notified() => return Exit::Cancelled,
                        result = self.finalizer.finalize(session, &user) => result,
                    };
                    return Exit::Finalized(result);
                }
                // Every handle is gone, nobody can finalize this session anymore
                None => return Exit::Cancelled,
            }
        }
    }

    /// Remove a scratch file left behind by a failed or cancelled open
    async fn discard_scratch(&self) {
        let path = self.scratch.scratch_path(&self.connection, &self.name);
        if let Err(err) = self.scratch.remove(&path).await {
            warn!(session_id = %self.id, path = %path.display(), error = %err, "Failed to delete scratch file");
        }
    }

    fn deregister(&self) {
        self.registry.remove(self.connection, &self.name, self.id);
    }
}
