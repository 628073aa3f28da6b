//! Relay service - Business logic orchestration
//!
//! Entry point used by the transport layer. The service resolves fragments
//! and finalize requests to session workers through the Session Registry and
//! tears down a connection's sessions when it goes away. It never touches a
//! Transfer Session directly: sessions live inside their workers.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{watch, Notify};
use tracing::{info, warn};

use super::{
    events::EventSender,
    finalizer::{Finalizer, FinalizerConfig},
    ids::{ConnectionId, ObjectName, SessionId, UserId},
    registry::{SessionHandle, SessionRegistry},
    worker::SessionWorker,
    IngestionError,
};
use crate::ports::{CatalogClient, EnrichmentProvider, RemoteStore, ScratchStore};

/// Default number of unacknowledged fragments a sender may have per session
pub const DEFAULT_MAX_IN_FLIGHT_FRAGMENTS: usize = 64;

/// Configuration for the relay service
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fragments a session will queue before the sender is considered to
    /// have overrun its budget (default: 64)
    pub max_in_flight_fragments: usize,
    pub finalizer: FinalizerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_in_flight_fragments: DEFAULT_MAX_IN_FLIGHT_FRAGMENTS,
            finalizer: FinalizerConfig::default(),
        }
    }
}

/// Service relaying streamed objects to the scratch and remote stores
///
/// ## Static Dispatch
///
/// The service is generic over every port it drives. The compiler generates
/// a specialized worker for each concrete combination of adapters.
pub struct RelayService<S, R, C, E> {
    registry: Arc<SessionRegistry>,
    scratch: Arc<S>,
    remote: Arc<R>,
    finalizer: Arc<Finalizer<S, C, E>>,
    config: SessionConfig,
}

impl<S, R, C, E> RelayService<S, R, C, E>
where
    S: ScratchStore,
    R: RemoteStore,
    C: CatalogClient,
    E: EnrichmentProvider,
{
    pub fn new(scratch: S, remote: R, catalog: C, enrichment: E, config: SessionConfig) -> Self {
        let scratch = Arc::new(scratch);
        let finalizer = Finalizer::new(
            scratch.clone(),
            Arc::new(catalog),
            Arc::new(enrichment),
            config.finalizer.clone(),
        );

        Self {
            registry: Arc::new(SessionRegistry::new()),
            scratch,
            remote: Arc::new(remote),
            finalizer: Arc::new(finalizer),
            config,
        }
    }

    /// Accept one fragment of object `name` on a connection
    ///
    /// Creates the session on the first fragment for the key. The fragment is
    /// queued to the session worker, which emits `progress` and `ack` on
    /// `events` once both sinks hold it. Must be called from within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// - `IngestionError::InvalidName` if `name` is unsafe; nothing is created
    /// - `IngestionError::SessionNotFound` if the session is finalizing or gone
    /// - `IngestionError::InFlightLimit` if the sender overran its budget; the
    ///   session is aborted
    pub fn fragment(
        &self,
        connection: ConnectionId,
        events: &EventSender,
        name: &str,
        chunk: Bytes,
        seq: u64,
    ) -> Result<SessionId, IngestionError> {
        let name = ObjectName::parse(name)?;

        let (handle, _) = self.registry.get_or_insert_with(connection, &name, || {
            self.spawn_session(connection, &name, events.clone())
        });

        match handle.try_send_fragment(chunk, seq) {
            Ok(()) => Ok(handle.id()),
            Err(err @ IngestionError::InFlightLimit { .. }) => {
                warn!(
                    connection_id = %connection,
                    session_id = %handle.id(),
                    name = %name,
                    seq = seq,
                    "Sender overran its fragment budget, aborting session"
                );
                handle.cancel();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Ask the session for `name` to finalize on behalf of `user`
    ///
    /// Never waits: the request takes the session's finalize slot and is
    /// handled after the fragments already queued. The outcome reaches the
    /// client as a `finalized` or `upload-error` event.
    ///
    /// # Errors
    ///
    /// - `IngestionError::InvalidName` if `name` is unsafe
    /// - `IngestionError::SessionNotFound` if there is no streaming session,
    ///   or finalization was already requested
    pub fn finalize(
        &self,
        connection: ConnectionId,
        name: &str,
        user: UserId,
    ) -> Result<SessionId, IngestionError> {
        let name = ObjectName::parse(name)?;
        let handle = self
            .registry
            .get(connection, &name)
            .ok_or_else(|| IngestionError::session_not_found(name.as_str()))?;

        info!(
            connection_id = %connection,
            session_id = %handle.id(),
            name = %name,
            user_id = %user,
            "Finalize requested"
        );

        handle.request_finalize(user)?;
        Ok(handle.id())
    }

    /// Abort every session of a closed connection
    ///
    /// No event is emitted to the (gone) client. Returns the number of
    /// sessions cancelled.
    pub fn disconnect(&self, connection: ConnectionId) -> usize {
        self.registry.remove_all(connection)
    }

    /// Cancel every live session and wait for the workers to clean up
    ///
    /// Gives up waiting after `grace`. Returns the number of sessions
    /// cancelled.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let handles = self.registry.cancel_all();
        if handles.is_empty() {
            return 0;
        }
        info!(sessions = handles.len(), "Cancelling live sessions");

        let all_finished = async {
            for handle in &handles {
                handle.finished().await;
            }
        };
        if tokio::time::timeout(grace, all_finished).await.is_err() {
            warn!(grace_secs = grace.as_secs(), "Sessions still cleaning up after grace period");
        }
        handles.len()
    }

    /// Number of live sessions across all connections
    pub fn active_sessions(&self) -> usize {
        self.registry.active_sessions()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Get the service configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn spawn_session(
        &self,
        connection: ConnectionId,
        name: &ObjectName,
        events: EventSender,
    ) -> SessionHandle {
        let id = SessionId::new();
        let cancel = Arc::new(Notify::new());
        let (finished_tx, finished_rx) = watch::channel(());
        let (handle, inbox) = SessionHandle::open(
            id,
            name.clone(),
            self.config.max_in_flight_fragments,
            cancel.clone(),
            finished_rx,
        );

        let worker = SessionWorker {
            id,
            connection,
            name: name.clone(),
            scratch: self.scratch.clone(),
            remote: self.remote.clone(),
            finalizer: self.finalizer.clone(),
            registry: self.registry.clone(),
            events,
            inbox,
            cancel,
            finished: finished_tx,
        };
        tokio::spawn(worker.run());

        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::ingestion::enrichment::{StructuredContent, FALLBACK_TITLE};
    use crate::ingestion::events::ClientEvent;
    use crate::ports::PlanTier;
    use crate::test_support::{
        CatalogRecord, EnrichmentCall, MemoryRemote, MemoryScratch, RecordingCatalog,
        ScriptedEnrichment,
    };

    const MIB: u64 = 1024 * 1024;

    type TestService =
        RelayService<MemoryScratch, MemoryRemote, RecordingCatalog, ScriptedEnrichment>;

    struct Harness {
        service: TestService,
        scratch: MemoryScratch,
        remote: MemoryRemote,
        catalog: RecordingCatalog,
        enrichment: ScriptedEnrichment,
        connection: ConnectionId,
        events: EventSender,
        received: mpsc::UnboundedReceiver<ClientEvent>,
    }

    impl Harness {
        fn new(scratch: MemoryScratch, catalog: RecordingCatalog, enrichment: ScriptedEnrichment) -> Self {
            Self::with_config(scratch, catalog, enrichment, SessionConfig::default())
        }

        fn with_config(
            scratch: MemoryScratch,
            catalog: RecordingCatalog,
            enrichment: ScriptedEnrichment,
            config: SessionConfig,
        ) -> Self {
            let remote = MemoryRemote::new();
            let service = RelayService::new(
                scratch.clone(),
                remote.clone(),
                catalog.clone(),
                enrichment.clone(),
                config,
            );
            let (events, received) = mpsc::unbounded_channel();

            Self {
                service,
                scratch,
                remote,
                catalog,
                enrichment,
                connection: ConnectionId::new(),
                events,
                received,
            }
        }

        fn free() -> Self {
            Self::new(
                MemoryScratch::new(),
                RecordingCatalog::new(PlanTier::Free),
                ScriptedEnrichment::new(Some("unused"), Some("{}")),
            )
        }

        fn send(&self, name: &str, payload: &'static [u8], seq: u64) -> Result<SessionId, IngestionError> {
            self.service.fragment(
                self.connection,
                &self.events,
                name,
                Bytes::from_static(payload),
                seq,
            )
        }

        fn scratch_path(&self, name: &str) -> std::path::PathBuf {
            self.scratch
                .scratch_path(&self.connection, &ObjectName::parse(name).unwrap())
        }

        async fn next_event(&mut self) -> ClientEvent {
            tokio::time::timeout(Duration::from_secs(5), self.received.recv())
                .await
                .expect("timed out waiting for a client event")
                .expect("event channel closed")
        }

        /// Collect events up to and including the first terminal one
        async fn events_until_terminal(&mut self) -> Vec<ClientEvent> {
            let mut events = Vec::new();
            loop {
                let event = self.next_event().await;
                let terminal = matches!(
                    event,
                    ClientEvent::Finalized { .. } | ClientEvent::UploadError { .. }
                );
                events.push(event);
                if terminal {
                    return events;
                }
            }
        }

        async fn wait_for(&self, condition: impl Fn() -> bool) {
            tokio::time::timeout(Duration::from_secs(5), async {
                while !condition() {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
            .await
            .expect("condition never held");
        }

        async fn wait_until_idle(&self) {
            tokio::time::timeout(Duration::from_secs(5), async {
                while self.service.active_sessions() > 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
            .await
            .expect("sessions did not wind down");
        }
    }

    fn progress(bytes_accepted: u64) -> ClientEvent {
        ClientEvent::Progress {
            name: "a.webm".to_string(),
            bytes_accepted,
        }
    }

    #[tokio::test]
    async fn test_stream_then_finalize_free_tier() {
        let mut h = Harness::free();

        for seq in 0..3 {
            h.send("a.webm", b"abc", seq).unwrap();
        }
        h.service
            .finalize(h.connection, "a.webm", UserId::new("42"))
            .unwrap();

        let events = h.events_until_terminal().await;
        assert_eq!(
            events,
            vec![
                progress(3),
                ClientEvent::Ack { seq: 0 },
                progress(6),
                ClientEvent::Ack { seq: 1 },
                progress(9),
                ClientEvent::Ack { seq: 2 },
                ClientEvent::Finalized {
                    name: "a.webm".to_string(),
                    locator: "memory://opal/a.webm".to_string(),
                },
            ]
        );

        h.wait_until_idle().await;
        assert_eq!(
            h.catalog.calls(),
            vec![
                CatalogRecord::ProcessingStarted { user: "42".into(), filename: "a.webm".into() },
                CatalogRecord::Complete { user: "42".into(), filename: "a.webm".into() },
            ]
        );
        assert!(h.enrichment.calls().is_empty());
        assert_eq!(h.remote.tap("a.webm").unwrap().written(), b"abcabcabc");

        let path = h.scratch_path("a.webm");
        assert!(!h.scratch.exists(&path));
        assert_eq!(h.scratch.remove_calls(&path), 1);
    }

    #[tokio::test]
    async fn test_disconnect_aborts_session_without_catalog_calls() {
        let mut h = Harness::free();

        h.send("b.webm", b"chunk", 0).unwrap();
        assert_eq!(h.next_event().await, ClientEvent::Progress { name: "b.webm".into(), bytes_accepted: 5 });
        assert_eq!(h.next_event().await, ClientEvent::Ack { seq: 0 });

        assert_eq!(h.service.disconnect(h.connection), 1);
        h.wait_until_idle().await;

        let path = h.scratch_path("b.webm");
        tokio::time::timeout(Duration::from_secs(5), async {
            while h.scratch.remove_calls(&path) == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        assert!(!h.scratch.exists(&path));
        assert_eq!(h.scratch.remove_calls(&path), 1);
        assert!(h.remote.tap("b.webm").unwrap().is_aborted());
        assert!(h.catalog.calls().is_empty());
        assert!(h.received.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_premium_small_object_is_enriched() {
        let mut h = Harness::new(
            MemoryScratch::new().with_reported_size(10 * MIB),
            RecordingCatalog::new(PlanTier::Pro),
            ScriptedEnrichment::new(
                Some("quarterly numbers look good"),
                Some(r#"{"title":"Q3 review","summary":"Numbers look good."}"#),
            ),
        );

        h.send("a.webm", b"video", 0).unwrap();
        h.service
            .finalize(h.connection, "a.webm", UserId::new("42"))
            .unwrap();
        let events = h.events_until_terminal().await;
        assert!(matches!(events.last(), Some(ClientEvent::Finalized { .. })));

        assert_eq!(
            h.enrichment.calls(),
            vec![EnrichmentCall::Transcribe { size: 5 }, EnrichmentCall::Summarize]
        );
        let calls = h.catalog.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], CatalogRecord::ProcessingStarted { .. }));
        assert_eq!(
            calls[1],
            CatalogRecord::Transcribed {
                user: "42".into(),
                filename: "a.webm".into(),
                content: StructuredContent {
                    title: "Q3 review".into(),
                    summary: "Numbers look good.".into(),
                },
                transcript: "quarterly numbers look good".into(),
            }
        );
        assert!(matches!(calls[2], CatalogRecord::Complete { .. }));
    }

    #[tokio::test]
    async fn test_premium_large_object_is_not_enriched() {
        let mut h = Harness::new(
            MemoryScratch::new().with_reported_size(30 * MIB),
            RecordingCatalog::new(PlanTier::Pro),
            ScriptedEnrichment::new(Some("text"), Some("{}")),
        );

        h.send("a.webm", b"video", 0).unwrap();
        h.service
            .finalize(h.connection, "a.webm", UserId::new("42"))
            .unwrap();
        h.events_until_terminal().await;

        assert!(h.enrichment.calls().is_empty());
        let calls = h.catalog.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], CatalogRecord::ProcessingStarted { .. }));
        assert!(matches!(calls[1], CatalogRecord::Complete { .. }));
    }

    #[tokio::test]
    async fn test_malformed_summary_uses_fallback_content() {
        let transcript = "word ".repeat(60);
        let mut h = Harness::new(
            MemoryScratch::new(),
            RecordingCatalog::new(PlanTier::Pro),
            ScriptedEnrichment::new(Some(&transcript), Some("not json")),
        );

        h.send("a.webm", b"video", 0).unwrap();
        h.service
            .finalize(h.connection, "a.webm", UserId::new("7"))
            .unwrap();
        h.events_until_terminal().await;

        let expected_summary = format!("{}...", &transcript[..200]);
        match &h.catalog.calls()[1] {
            CatalogRecord::Transcribed { content, .. } => {
                assert_eq!(content.title, FALLBACK_TITLE);
                assert_eq!(content.summary, expected_summary);
            }
            other => panic!("expected a transcribed call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_write_failure_fails_session() {
        let mut h = Harness::free();
        h.remote.fail_write_on(1);

        h.send("a.webm", b"abc", 0).unwrap();
        h.send("a.webm", b"def", 1).unwrap();

        let events = h.events_until_terminal().await;
        assert_eq!(
            events,
            vec![
                progress(3),
                ClientEvent::Ack { seq: 0 },
                ClientEvent::upload_error("Failed to save video chunk"),
            ]
        );

        h.wait_until_idle().await;
        let path = h.scratch_path("a.webm");
        assert!(!h.scratch.exists(&path));
        assert!(h.remote.tap("a.webm").unwrap().is_aborted());
        assert!(h.catalog.calls().is_empty());

        let err = h
            .service
            .finalize(h.connection, "a.webm", UserId::new("42"))
            .unwrap_err();
        assert!(matches!(err, IngestionError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_name_creates_nothing() {
        let h = Harness::free();

        let err = h.send("../etc/passwd", b"x", 0).unwrap_err();

        assert!(matches!(err, IngestionError::InvalidName { .. }));
        assert_eq!(h.service.active_sessions(), 0);
        assert!(h.scratch.created().is_empty());
    }

    #[tokio::test]
    async fn test_finalize_unknown_session_is_rejected() {
        let h = Harness::free();

        let err = h
            .service
            .finalize(h.connection, "missing.webm", UserId::new("42"))
            .unwrap_err();

        assert!(matches!(err, IngestionError::SessionNotFound { .. }));
        assert!(h.catalog.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fragments_for_one_key_share_a_session() {
        let mut h = Harness::free();

        let first = h.send("a.webm", b"a", 0).unwrap();
        let second = h.send("a.webm", b"b", 1).unwrap();
        let other = h.send("c.webm", b"c", 0).unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(h.service.active_sessions(), 2);
        assert_eq!(h.service.registry().connection_sessions(h.connection), 2);

        for _ in 0..6 {
            h.next_event().await;
        }
        assert_eq!(h.remote.opened(), 2);
    }

    #[tokio::test]
    async fn test_budget_overrun_aborts_session() {
        let h = Harness::with_config(
            MemoryScratch::new(),
            RecordingCatalog::new(PlanTier::Free),
            ScriptedEnrichment::new(None, None),
            SessionConfig {
                max_in_flight_fragments: 2,
                ..SessionConfig::default()
            },
        );

        // The worker has not run yet, so nothing is drained in between
        h.send("a.webm", b"a", 0).unwrap();
        h.send("a.webm", b"b", 1).unwrap();
        let err = h.send("a.webm", b"c", 2).unwrap_err();
        assert!(matches!(err, IngestionError::InFlightLimit { limit: 2, .. }));

        h.wait_until_idle().await;
        let path = h.scratch_path("a.webm");
        assert!(!h.scratch.exists(&path));
        assert!(h.catalog.calls().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_aborts_sessions_of_every_connection() {
        let mut h = Harness::free();
        let other = ConnectionId::new();

        h.send("a.webm", b"abc", 0).unwrap();
        h.service
            .fragment(other, &h.events, "b.webm", Bytes::from_static(b"xyz"), 0)
            .unwrap();
        for _ in 0..4 {
            h.next_event().await;
        }

        assert_eq!(h.service.shutdown(Duration::from_secs(5)).await, 2);

        assert_eq!(h.service.active_sessions(), 0);
        assert!(h.scratch.created().is_empty());
        assert!(h.remote.tap("a.webm").unwrap().is_aborted());
        assert!(h.remote.tap("b.webm").unwrap().is_aborted());
        assert!(h.catalog.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sink_open_failure_reports_upload_error() {
        let mut h = Harness::free();
        h.remote.fail_open();

        h.send("a.webm", b"abc", 0).unwrap();

        assert_eq!(
            h.next_event().await,
            ClientEvent::upload_error("Failed to save video chunk")
        );
        h.wait_until_idle().await;
        assert!(!h.scratch.exists(&h.scratch_path("a.webm")));
    }

    #[tokio::test]
    async fn test_local_write_failure_fails_session() {
        let mut h = Harness::free();
        h.scratch.fail_write_on(1);

        h.send("a.webm", b"abc", 0).unwrap();
        h.send("a.webm", b"def", 1).unwrap();

        let events = h.events_until_terminal().await;
        assert_eq!(
            events,
            vec![
                progress(3),
                ClientEvent::Ack { seq: 0 },
                ClientEvent::upload_error("Failed to save video chunk"),
            ]
        );

        h.wait_until_idle().await;
        let remote = h.remote.tap("a.webm").unwrap();
        // The remote sink never saw the rejected fragment
        assert_eq!(remote.writes(), 1);
        assert!(remote.is_aborted());
        let path = h.scratch_path("a.webm");
        assert!(!h.scratch.exists(&path));
        assert_eq!(h.scratch.remove_calls(&path), 1);
        assert!(h.catalog.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scratch_create_failure_opens_no_remote() {
        let mut h = Harness::free();
        h.scratch.fail_create();

        h.send("a.webm", b"abc", 0).unwrap();

        assert_eq!(
            h.next_event().await,
            ClientEvent::upload_error("Failed to save video chunk")
        );
        h.wait_until_idle().await;
        assert_eq!(h.remote.opened(), 0);
        assert!(h.scratch.created().is_empty());
    }

    #[tokio::test]
    async fn test_remote_end_failure_reports_upload_error() {
        let mut h = Harness::free();
        h.remote.fail_end();

        h.send("a.webm", b"abc", 0).unwrap();
        h.service
            .finalize(h.connection, "a.webm", UserId::new("42"))
            .unwrap();

        let events = h.events_until_terminal().await;
        assert_eq!(events.last(), Some(&ClientEvent::upload_error("Failed to upload video")));

        h.wait_until_idle().await;
        assert!(h.catalog.calls().is_empty());
        assert!(!h.scratch.exists(&h.scratch_path("a.webm")));
    }

    #[tokio::test]
    async fn test_finalize_does_not_wait_behind_a_stalled_sink() {
        let mut h = Harness::with_config(
            MemoryScratch::new(),
            RecordingCatalog::new(PlanTier::Free),
            ScriptedEnrichment::new(None, None),
            SessionConfig {
                max_in_flight_fragments: 1,
                ..SessionConfig::default()
            },
        );

        h.send("a.webm", b"a", 0).unwrap();
        assert_eq!(h.next_event().await, progress(1));
        assert_eq!(h.next_event().await, ClientEvent::Ack { seq: 0 });

        // Stall the worker on seq 1, then fill its queue with seq 2
        let remote = h.remote.tap("a.webm").unwrap();
        remote.set_saturated(true);
        h.send("a.webm", b"b", 1).unwrap();
        h.wait_for(|| remote.writes() == 2).await;
        h.send("a.webm", b"c", 2).unwrap();

        h.service
            .finalize(h.connection, "a.webm", UserId::new("42"))
            .unwrap();
        let err = h.send("a.webm", b"d", 3).unwrap_err();
        assert!(matches!(err, IngestionError::SessionNotFound { .. }));

        // Other objects on the connection keep flowing
        h.send("b.webm", b"xy", 0).unwrap();
        assert_eq!(
            h.next_event().await,
            ClientEvent::Progress { name: "b.webm".into(), bytes_accepted: 2 }
        );
        assert_eq!(h.next_event().await, ClientEvent::Ack { seq: 0 });

        remote.set_saturated(false);
        remote.release_drain();

        let events = h.events_until_terminal().await;
        assert_eq!(
            events,
            vec![
                progress(2),
                ClientEvent::Ack { seq: 1 },
                progress(3),
                ClientEvent::Ack { seq: 2 },
                ClientEvent::Finalized {
                    name: "a.webm".to_string(),
                    locator: "memory://opal/a.webm".to_string(),
                },
            ]
        );
        assert_eq!(remote.written(), b"abc");
    }

    #[tokio::test]
    async fn test_disconnect_while_finalizing_discards_the_upload() {
        let mut h = Harness::new(
            MemoryScratch::new(),
            RecordingCatalog::new(PlanTier::Free).stall_processing(),
            ScriptedEnrichment::new(None, None),
        );

        h.send("a.webm", b"abc", 0).unwrap();
        h.next_event().await;
        h.next_event().await;
        h.service
            .finalize(h.connection, "a.webm", UserId::new("42"))
            .unwrap();
        h.wait_for(|| h.catalog.calls().len() == 1).await;

        assert_eq!(h.service.disconnect(h.connection), 1);

        let path = h.scratch_path("a.webm");
        h.wait_for(|| h.scratch.remove_calls(&path) > 0).await;
        assert!(!h.scratch.exists(&path));
        assert_eq!(h.scratch.remove_calls(&path), 1);
        assert_eq!(
            h.catalog.calls(),
            vec![CatalogRecord::ProcessingStarted { user: "42".into(), filename: "a.webm".into() }]
        );
        assert!(h.received.try_recv().is_err());
    }
}
