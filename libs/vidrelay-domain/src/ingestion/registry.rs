//! Session Registry
//!
//! Maps (connection, object name) to the handle of the session worker that
//! owns the Transfer Session. The registry only stores handles; the sessions
//! themselves live inside their workers. The map is behind a plain mutex that
//! is never held across an await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    watch, Notify,
};
use tracing::{debug, info};

use crate::ingestion::{
    error::IngestionError,
    ids::{ConnectionId, ObjectName, SessionId, UserId},
};

/// Work item for a session worker
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Fragment { chunk: Bytes, seq: u64 },
    Finalize { user: UserId },
}

/// Cheap, cloneable reference to a running session worker
///
/// Fragments and the finalize request travel on separate queues. The
/// finalize queue holds a single slot, so requesting finalization never
/// waits behind a session whose fragment queue is full.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    name: ObjectName,
    fragments: mpsc::Sender<SessionCommand>,
    finalize: mpsc::Sender<UserId>,
    finalizing: Arc<AtomicBool>,
    cancel: Arc<Notify>,
    finished: watch::Receiver<()>,
}

impl SessionHandle {
    /// Create the handle and the worker's inbox
    ///
    /// `capacity` is the number of fragments the worker may have queued.
    pub(crate) fn open(
        id: SessionId,
        name: ObjectName,
        capacity: usize,
        cancel: Arc<Notify>,
        finished: watch::Receiver<()>,
    ) -> (Self, SessionInbox) {
        let (fragments_tx, fragments) = mpsc::channel(capacity.max(1));
        let (finalize_tx, finalize) = mpsc::channel(1);

        let handle = Self {
            id,
            name,
            fragments: fragments_tx,
            finalize: finalize_tx,
            finalizing: Arc::new(AtomicBool::new(false)),
            cancel,
            finished,
        };
        (handle, SessionInbox { fragments, finalize })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &ObjectName {
        &self.name
    }

    /// Whether the worker stopped taking commands (finalizing or gone)
    pub fn is_closed(&self) -> bool {
        self.fragments.is_closed()
    }

    /// Ask the worker to abort the session
    ///
    /// The signal is remembered, so it is honored even if the worker is not
    /// waiting at this instant.
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }

    /// Wait until the worker has stopped and released its resources
    pub async fn finished(&self) {
        let mut finished = self.finished.clone();
        // Nothing is ever sent: this only ends when the worker drops its side
        while finished.changed().await.is_ok() {}
    }

    /// Queue a fragment without waiting
    ///
    /// Refused once finalization was requested.
    pub(crate) fn try_send_fragment(&self, chunk: Bytes, seq: u64) -> Result<(), IngestionError> {
        if self.finalizing.load(Ordering::Acquire) {
            return Err(IngestionError::session_not_found(self.name.as_str()));
        }

        self.fragments
            .try_send(SessionCommand::Fragment { chunk, seq })
            .map_err(|err| match err {
                TrySendError::Full(_) => IngestionError::InFlightLimit {
                    name: self.name.to_string(),
                    limit: self.fragments.max_capacity(),
                },
                TrySendError::Closed(_) => IngestionError::session_not_found(self.name.as_str()),
            })
    }

    /// Queue the finalize request without waiting
    ///
    /// The worker handles it after every fragment queued before it. Only the
    /// first request is accepted.
    pub(crate) fn request_finalize(&self, user: UserId) -> Result<(), IngestionError> {
        if self.finalizing.swap(true, Ordering::AcqRel) {
            return Err(IngestionError::session_not_found(self.name.as_str()));
        }

        self.finalize
            .try_send(user)
            .map_err(|_| IngestionError::session_not_found(self.name.as_str()))
    }
}

/// Worker side of a session's queues
pub(crate) struct SessionInbox {
    fragments: mpsc::Receiver<SessionCommand>,
    finalize: mpsc::Receiver<UserId>,
}

impl SessionInbox {
    /// Next command, fragments first
    ///
    /// Returns `None` once every handle is gone and both queues are empty.
    pub(crate) async fn recv(&mut self) -> Option<SessionCommand> {
        tokio::select! {
            biased;
            Some(command) = self.fragments.recv() => Some(command),
            Some(user) = self.finalize.recv() => Some(SessionCommand::Finalize { user }),
            else => None,
        }
    }

    /// Stop accepting commands from every handle
    pub(crate) fn close(&mut self) {
        self.fragments.close();
        self.finalize.close();
    }
}

type ConnectionSessions = HashMap<ObjectName, SessionHandle>;

/// Registry of live sessions, keyed by connection then object name
///
/// Invariant: at most one session per (connection, name) key. A key stays
/// occupied until its worker removes it, including while the session is
/// finalizing, so two sessions can never share a scratch path.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnectionId, ConnectionSessions>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<ConnectionId, ConnectionSessions>> {
        // The map stays consistent even if a holder panicked
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the session for the key, creating it with `create` if absent
    ///
    /// `create` runs under the registry lock, so concurrent callers for the
    /// same key can never both create a session. The boolean is `true` when a
    /// new session was created.
    pub fn get_or_insert_with<F>(
        &self,
        connection: ConnectionId,
        name: &ObjectName,
        create: F,
    ) -> (SessionHandle, bool)
    where
        F: FnOnce() -> SessionHandle,
    {
        let mut sessions = self.sessions();
        let by_name = sessions.entry(connection).or_default();

        if let Some(existing) = by_name.get(name) {
            return (existing.clone(), false);
        }

        let handle = create();
        debug!(
            connection_id = %connection,
            session_id = %handle.id(),
            name = %name,
            "Session registered"
        );
        by_name.insert(name.clone(), handle.clone());
        (handle, true)
    }

    /// Look up the session for the key
    pub fn get(&self, connection: ConnectionId, name: &ObjectName) -> Option<SessionHandle> {
        self.sessions()
            .get(&connection)
            .and_then(|by_name| by_name.get(name))
            .cloned()
    }

    /// Remove the session for the key if it is still session `id`
    ///
    /// Idempotent: removing an absent (or already replaced) session is a
    /// no-op. Returns whether an entry was removed.
    pub fn remove(&self, connection: ConnectionId, name: &ObjectName, id: SessionId) -> bool {
        let mut sessions = self.sessions();
        let Some(by_name) = sessions.get_mut(&connection) else {
            return false;
        };

        let removed = match by_name.get(name) {
            Some(handle) if handle.id() == id => by_name.remove(name).is_some(),
            _ => false,
        };
        if by_name.is_empty() {
            sessions.remove(&connection);
        }

        if removed {
            debug!(connection_id = %connection, session_id = %id, name = %name, "Session removed");
        }
        removed
    }

    /// Remove and cancel every session of a connection
    ///
    /// Called on disconnect. Each worker aborts its session (sinks destroyed,
    /// scratch file deleted) when it observes the cancellation. Returns the
    /// number of sessions cancelled.
    pub fn remove_all(&self, connection: ConnectionId) -> usize {
        let removed = self.sessions().remove(&connection).unwrap_or_default();

        for handle in removed.values() {
            handle.cancel();
        }

        if !removed.is_empty() {
            info!(
                connection_id = %connection,
                sessions = removed.len(),
                "Cancelled sessions of closed connection"
            );
        }
        removed.len()
    }

    /// Remove and cancel every session of every connection
    ///
    /// Used on shutdown. Returns the cancelled handles so the caller can wait
    /// for the workers to finish.
    pub fn cancel_all(&self) -> Vec<SessionHandle> {
        let all = std::mem::take(&mut *self.sessions());
        let handles: Vec<SessionHandle> = all.into_values().flat_map(HashMap::into_values).collect();

        for handle in &handles {
            handle.cancel();
        }
        handles
    }

    /// Number of live sessions across all connections
    pub fn active_sessions(&self) -> usize {
        self.sessions().values().map(HashMap::len).sum()
    }

    /// Number of live sessions of one connection
    pub fn connection_sessions(&self, connection: ConnectionId) -> usize {
        self.sessions()
            .get(&connection)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}
