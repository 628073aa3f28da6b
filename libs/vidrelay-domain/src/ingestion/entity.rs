//! Domain entities for media transfers
//!
//! This module defines the core domain model of VidRelay. A Transfer Session
//! represents one in-flight object transfer: the two sinks fragments are
//! replicated to, the progress counters, and the finalization state machine.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ingestion::{
    error::IngestionError,
    ids::{ConnectionId, ObjectName, SessionId},
};

/// Lifecycle state of a Transfer Session
///
/// ```text
/// STREAMING -> FINALIZING -> [ENRICHING] -> NOTIFYING -> DONE
///     \____________\_____________\_____________\______-> FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Streaming,
    Finalizing,
    Enriching,
    Notifying,
    Done,
    Failed,
}

impl SessionState {
    /// `DONE` and `FAILED` are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (*self, next) {
            (Streaming, Finalizing)
            | (Finalizing, Enriching)
            | (Finalizing, Notifying)
            | (Enriching, Notifying)
            | (Notifying, Done) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Streaming => "STREAMING",
            SessionState::Finalizing => "FINALIZING",
            SessionState::Enriching => "ENRICHING",
            SessionState::Notifying => "NOTIFYING",
            SessionState::Done => "DONE",
            SessionState::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// One in-flight object transfer
///
/// The session is a plain value owned by its session worker and lent `&mut`
/// to the Flow Controller while streaming and to the Finalizer afterwards.
/// Sinks are held in `Option`s: ending or aborting a sink takes it out, so a
/// sink can never be written to after either call. The remote sink's
/// completion (its locator) is resolved by the sink itself when it is ended.
pub struct TransferSession<L, R> {
    id: SessionId,
    connection: ConnectionId,
    name: ObjectName,
    scratch_path: PathBuf,
    local: Option<L>,
    remote: Option<R>,
    bytes_accepted: u64,
    fragments_accepted: u64,
    highest_acknowledged_seq: Option<u64>,
    state: SessionState,
    scratch_released: bool,
    created_at: DateTime<Utc>,
}

impl<L, R> TransferSession<L, R> {
    /// Create a streaming session around freshly opened sinks
    pub fn new(
        id: SessionId,
        connection: ConnectionId,
        name: ObjectName,
        scratch_path: PathBuf,
        local: L,
        remote: R,
    ) -> Self {
        Self {
            id,
            connection,
            name,
            scratch_path,
            local: Some(local),
            remote: Some(remote),
            bytes_accepted: 0,
            fragments_accepted: 0,
            highest_acknowledged_seq: None,
            state: SessionState::Streaming,
            scratch_released: false,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn name(&self) -> &ObjectName {
        &self.name
    }

    pub fn scratch_path(&self) -> &Path {
        &self.scratch_path
    }

    /// Total bytes accepted by both sinks so far
    pub fn bytes_accepted(&self) -> u64 {
        self.bytes_accepted
    }

    pub fn fragments_accepted(&self) -> u64 {
        self.fragments_accepted
    }

    pub fn highest_acknowledged_seq(&self) -> Option<u64> {
        self.highest_acknowledged_seq
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    /// Whether the session still accepts fragments
    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    /// Move the state machine forward
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::InvalidTransition` if the move is not allowed;
    /// the state is left untouched in that case.
    pub fn transition(&mut self, next: SessionState) -> Result<(), IngestionError> {
        if !self.state.can_transition_to(next) {
            return Err(IngestionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Mark the session failed unless it already reached a terminal state
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Failed;
        }
    }

    /// Both sinks, if neither has been ended or aborted
    pub(crate) fn sinks_mut(&mut self) -> Option<(&mut L, &mut R)> {
        match (self.local.as_mut(), self.remote.as_mut()) {
            (Some(local), Some(remote)) => Some((local, remote)),
            _ => None,
        }
    }

    /// Take the sinks out for `end` or `abort`
    pub(crate) fn take_sinks(&mut self) -> (Option<L>, Option<R>) {
        (self.local.take(), self.remote.take())
    }

    pub(crate) fn has_sinks(&self) -> bool {
        self.local.is_some() || self.remote.is_some()
    }

    /// Record a fragment accepted by both sinks
    pub(crate) fn record_accepted(&mut self, len: u64, seq: u64) {
        self.bytes_accepted = self.bytes_accepted.saturating_add(len);
        self.fragments_accepted += 1;
        self.highest_acknowledged_seq = Some(match self.highest_acknowledged_seq {
            Some(highest) => highest.max(seq),
            None => seq,
        });
    }

    /// Claim the scratch file for deletion
    ///
    /// Returns `true` only for the first caller, so the file is deleted at
    /// most once whichever exit path gets there first.
    pub(crate) fn claim_scratch_release(&mut self) -> bool {
        !std::mem::replace(&mut self.scratch_released, true)
    }

    pub fn is_scratch_released(&self) -> bool {
        self.scratch_released
    }
}

impl<L, R> fmt::Debug for TransferSession<L, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferSession")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .field("name", &self.name)
            .field("scratch_path", &self.scratch_path)
            .field("bytes_accepted", &self.bytes_accepted)
            .field("highest_acknowledged_seq", &self.highest_acknowledged_seq)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> TransferSession<(), ()> {
        TransferSession::new(
            SessionId::new(),
            ConnectionId::new(),
            ObjectName::parse("a.webm").unwrap(),
            PathBuf::from("/tmp/a.webm"),
            (),
            (),
        )
    }

    #[test]
    fn test_session_creation() {
        let session = session();

        assert_eq!(session.state(), SessionState::Streaming);
        assert!(session.is_streaming());
        assert_eq!(session.bytes_accepted(), 0);
        assert!(session.highest_acknowledged_seq().is_none());
        assert!(!session.is_scratch_released());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut session = session();

        session.transition(SessionState::Finalizing).unwrap();
        session.transition(SessionState::Enriching).unwrap();
        session.transition(SessionState::Notifying).unwrap();
        session.transition(SessionState::Done).unwrap();

        assert!(session.state().is_terminal());
    }

    #[test]
    fn test_enrichment_is_optional() {
        let mut session = session();

        session.transition(SessionState::Finalizing).unwrap();
        session.transition(SessionState::Notifying).unwrap();
        session.transition(SessionState::Done).unwrap();
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let mut session = session();

        let err = session.transition(SessionState::Done).unwrap_err();
        assert!(matches!(err, IngestionError::InvalidTransition { .. }));
        assert_eq!(session.state(), SessionState::Streaming);

        session.transition(SessionState::Finalizing).unwrap();
        assert!(session.transition(SessionState::Streaming).is_err());
    }

    #[test]
    fn test_failed_is_reachable_from_every_live_state_only() {
        for state in [
            SessionState::Streaming,
            SessionState::Finalizing,
            SessionState::Enriching,
            SessionState::Notifying,
        ] {
            assert!(state.can_transition_to(SessionState::Failed));
        }
        assert!(!SessionState::Done.can_transition_to(SessionState::Failed));
        assert!(!SessionState::Failed.can_transition_to(SessionState::Failed));
    }

    #[test]
    fn test_fail_does_not_overwrite_done() {
        let mut session = session();
        session.transition(SessionState::Finalizing).unwrap();
        session.transition(SessionState::Notifying).unwrap();
        session.transition(SessionState::Done).unwrap();

        session.fail();
        assert_eq!(session.state(), SessionState::Done);
    }

    #[test]
    fn test_record_accepted_is_monotonic() {
        let mut session = session();

        session.record_accepted(10, 0);
        session.record_accepted(0, 1);
        session.record_accepted(5, 2);

        assert_eq!(session.bytes_accepted(), 15);
        assert_eq!(session.fragments_accepted(), 3);
        assert_eq!(session.highest_acknowledged_seq(), Some(2));
    }

    #[test]
    fn test_scratch_release_is_claimed_once() {
        let mut session = session();

        assert!(session.claim_scratch_release());
        assert!(!session.claim_scratch_release());
        assert!(session.is_scratch_released());
    }

    #[test]
    fn test_taken_sinks_are_gone() {
        let mut session = session();
        assert!(session.sinks_mut().is_some());

        let (local, remote) = session.take_sinks();
        assert!(local.is_some() && remote.is_some());
        assert!(session.sinks_mut().is_none());
        assert!(!session.has_sinks());
    }
}
