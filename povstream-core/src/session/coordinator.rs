use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Error, Result};

use super::event::{ControlMessage, SessionEvent, SessionSnapshot, TARGET_ALL};
use super::state::{Effect, ParticipantInfo, SessionState, Tile};

/// Window within which bursts of session events collapse into one
/// projection recompute.
pub const RECOMPUTE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Abstraction over the connected media session. The production
/// implementation wraps the provider SDK; tests substitute a fake.
#[async_trait]
pub trait RoomSession: Send + Sync {
    /// Identity this client joined the session as.
    fn local_identity(&self) -> String;

    /// Current authoritative view of the session.
    fn snapshot(&self) -> SessionSnapshot;

    /// Publish a payload on the session's reliable data channel.
    async fn publish_data(&self, payload: Vec<u8>) -> Result<()>;

    /// Stop and unpublish every local track publication.
    async fn stop_local_tracks(&self) -> Result<()>;

    /// Disconnect from the session.
    async fn disconnect(&self) -> Result<()>;
}

/// Notices the coordinator surfaces to its owner (the UI layer or an
/// integration shim).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// This client's own publish session was ended remotely.
    StreamEnded,
    /// Informational message, no local state change.
    Notice(String),
    /// The room was deleted; the owner should tear down and navigate away.
    RoomDeleted,
    /// Projections changed after a recompute.
    StateChanged {
        tiles: Vec<Tile>,
        participants: Vec<ParticipantInfo>,
    },
}

/// Handle to a running session coordinator task.
///
/// Dropping the handle does not stop the task; call [`shutdown`] (or cancel
/// the token passed at spawn) for a clean exit. Local tracks are stopped and
/// the session disconnected on every exit path.
///
/// [`shutdown`]: SessionHandle::shutdown
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    session: Arc<dyn RoomSession>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl SessionHandle {
    /// Spawn the coordinator loop over `session`. Events are fed through the
    /// returned handle; notices arrive on `notices`.
    pub fn spawn(
        session: Arc<dyn RoomSession>,
        notices: mpsc::UnboundedSender<SessionNotice>,
        cancel: CancellationToken,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_loop(
            session.clone(),
            event_rx,
            notices,
            cancel.clone(),
        ));

        Self {
            events: event_tx,
            session,
            cancel,
            task,
        }
    }

    /// Feed an observed session event into the coordinator. Events arriving
    /// after shutdown are dropped.
    pub fn push_event(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session coordinator already stopped, dropping event");
        }
    }

    /// Sender half of the event channel, for feeders that outlive borrows of
    /// the handle (e.g. the liveness prober).
    pub fn event_sender(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.events.clone()
    }

    /// End the stream of `target` (`"*"` for everyone). The local side
    /// stops its own tracks first when it is targeted, so the sender never
    /// depends on receiving its own data message back.
    pub async fn broadcast_end(&self, target: &str) -> Result<()> {
        let local = self.session.local_identity();
        if target == local || target == TARGET_ALL {
            self.session.stop_local_tracks().await?;
        }

        let message = ControlMessage::end_stream(target);
        let payload = serde_json::to_vec(&message)?;
        self.session.publish_data(payload).await
    }

    /// Stop the coordinator and wait for its teardown to finish.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| Error::Internal(format!("session coordinator panicked: {e}")))
    }
}

async fn run_loop(
    session: Arc<dyn RoomSession>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    notices: mpsc::UnboundedSender<SessionNotice>,
    cancel: CancellationToken,
) {
    let local_identity = session.local_identity();
    let mut state = SessionState::new();

    // Initial projection from whatever the session already contains.
    state.recompute(&session.snapshot());
    emit_state(&notices, &state);

    // One pending deadline at a time; a burst of events only pushes it out.
    let mut recompute_at: Option<Instant> = None;
    let mut leave_requested = false;

    loop {
        let debounce = async {
            match recompute_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = cancel.cancelled() => {
                info!(identity = %local_identity, "Session coordinator stopping");
                break;
            }
            () = debounce => {
                recompute_at = None;
                state.recompute(&session.snapshot());
                emit_state(&notices, &state);
            }
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Event feed closed, stopping session coordinator");
                    break;
                };

                let snapshot = session.snapshot();
                let effects = state.apply(event, &local_identity, &snapshot);
                emit_state(&notices, &state);

                for effect in effects {
                    match effect {
                        Effect::StopLocalTracks => {
                            if let Err(e) = session.stop_local_tracks().await {
                                warn!(error = %e, "Failed to stop local tracks");
                            }
                        }
                        Effect::NotifyStreamEnded => {
                            let _ = notices.send(SessionNotice::StreamEnded);
                        }
                        Effect::Notice(text) => {
                            let _ = notices.send(SessionNotice::Notice(text));
                        }
                        Effect::LeaveRoom => {
                            let _ = notices.send(SessionNotice::RoomDeleted);
                            leave_requested = true;
                        }
                        Effect::ScheduleRecompute => {
                            recompute_at = Some(Instant::now() + RECOMPUTE_DEBOUNCE);
                        }
                    }
                }

                if leave_requested {
                    break;
                }
            }
        }
    }

    // Teardown runs on every exit path: cancellation, feed closure and
    // room deletion all leave the session clean.
    if let Err(e) = session.stop_local_tracks().await {
        warn!(error = %e, "Failed to stop local tracks during teardown");
    }
    if let Err(e) = session.disconnect().await {
        warn!(error = %e, "Failed to disconnect session during teardown");
    }
    info!(identity = %local_identity, "Session coordinator stopped");
}

fn emit_state(notices: &mpsc::UnboundedSender<SessionNotice>, state: &SessionState) {
    let _ = notices.send(SessionNotice::StateChanged {
        tiles: state.tiles(),
        participants: state.participants().to_vec(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::event::{ParticipantSnapshot, PublicationSnapshot, TrackKind};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeSession {
        snapshot: Mutex<SessionSnapshot>,
        published: Mutex<Vec<Vec<u8>>>,
        stops: Mutex<usize>,
        disconnects: Mutex<usize>,
    }

    impl FakeSession {
        fn stop_count(&self) -> usize {
            *self.stops.lock()
        }

        fn disconnect_count(&self) -> usize {
            *self.disconnects.lock()
        }
    }

    #[async_trait]
    impl RoomSession for FakeSession {
        fn local_identity(&self) -> String {
            "me".to_string()
        }

        fn snapshot(&self) -> SessionSnapshot {
            self.snapshot.lock().clone()
        }

        async fn publish_data(&self, payload: Vec<u8>) -> Result<()> {
            self.published.lock().push(payload);
            Ok(())
        }

        async fn stop_local_tracks(&self) -> Result<()> {
            *self.stops.lock() += 1;
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            *self.disconnects.lock() += 1;
            Ok(())
        }
    }

    fn remote_with_video(identity: &str, sid: &str) -> ParticipantSnapshot {
        ParticipantSnapshot {
            identity: identity.to_string(),
            name: Some(identity.to_string()),
            metadata: None,
            is_local: false,
            is_speaking: false,
            publications: vec![PublicationSnapshot {
                sid: sid.to_string(),
                kind: TrackKind::Video,
                muted: false,
                live: true,
                enabled: true,
            }],
        }
    }

    async fn next_state_change(
        rx: &mut mpsc::UnboundedReceiver<SessionNotice>,
    ) -> (Vec<Tile>, Vec<ParticipantInfo>) {
        loop {
            match rx.recv().await {
                Some(SessionNotice::StateChanged {
                    tiles,
                    participants,
                }) => return (tiles, participants),
                Some(_) => continue,
                None => panic!("notice channel closed"),
            }
        }
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_session() {
        let session = Arc::new(FakeSession::default());
        let (notice_tx, _notice_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::spawn(
            session.clone(),
            notice_tx,
            CancellationToken::new(),
        );

        handle.shutdown().await.expect("clean shutdown");
        assert_eq!(session.stop_count(), 1);
        assert_eq!(session.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_track_subscription_updates_projection() {
        let session = Arc::new(FakeSession::default());
        let remote = remote_with_video("pov-1", "TR_V1");
        session.snapshot.lock().participants.push(remote.clone());

        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::spawn(
            session.clone(),
            notice_tx,
            CancellationToken::new(),
        );

        // Initial recompute already sees the participant.
        let (tiles, participants) = next_state_change(&mut notice_rx).await;
        assert!(tiles.is_empty());
        assert_eq!(participants.len(), 1);

        handle.push_event(SessionEvent::RemoteTrackSubscribed {
            publication: remote.publications[0].clone(),
            participant: remote,
        });

        let (tiles, _) = next_state_change(&mut notice_rx).await;
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].sid, "TR_V1");

        handle.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_stream_burst_coalesces_into_one_recompute() {
        let session = Arc::new(FakeSession::default());
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::spawn(
            session.clone(),
            notice_tx,
            CancellationToken::new(),
        );
        // Drain the initial projection.
        let _ = next_state_change(&mut notice_rx).await;

        let payload = serde_json::to_vec(&ControlMessage::end_stream("*")).expect("encode");
        handle.push_event(SessionEvent::DataReceived {
            payload: payload.clone(),
        });
        handle.push_event(SessionEvent::DataReceived { payload });
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        // Both messages stop local tracks but only schedule one deadline.
        tokio::time::advance(RECOMPUTE_DEBOUNCE + Duration::from_millis(1)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        let mut stream_ended = 0;
        let mut state_changes = 0;
        while let Ok(notice) = notice_rx.try_recv() {
            match notice {
                SessionNotice::StreamEnded => stream_ended += 1,
                SessionNotice::StateChanged { .. } => state_changes += 1,
                _ => {}
            }
        }
        assert_eq!(stream_ended, 2);
        // Two per-event emissions plus exactly one debounced recompute.
        assert_eq!(state_changes, 3);
        assert!(session.stop_count() >= 1);

        handle.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test]
    async fn test_room_deleted_leaves_and_disconnects() {
        let session = Arc::new(FakeSession::default());
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::spawn(
            session.clone(),
            notice_tx,
            CancellationToken::new(),
        );

        let payload = serde_json::to_vec(&ControlMessage::RoomDeleted).expect("encode");
        handle.push_event(SessionEvent::DataReceived { payload });

        let mut saw_deleted = false;
        while let Some(notice) = notice_rx.recv().await {
            if notice == SessionNotice::RoomDeleted {
                saw_deleted = true;
                break;
            }
        }
        assert!(saw_deleted);

        handle.shutdown().await.expect("clean shutdown");
        assert!(session.disconnect_count() >= 1);
    }

    #[tokio::test]
    async fn test_broadcast_end_stops_self_before_publishing() {
        let session = Arc::new(FakeSession::default());
        let (notice_tx, _notice_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::spawn(
            session.clone(),
            notice_tx,
            CancellationToken::new(),
        );

        handle.broadcast_end(TARGET_ALL).await.expect("broadcast");
        assert_eq!(session.stop_count(), 1);

        let published = session.published.lock().clone();
        assert_eq!(published.len(), 1);
        let message: ControlMessage =
            serde_json::from_slice(&published[0]).expect("valid control message");
        assert_eq!(message, ControlMessage::end_stream("*"));

        handle.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test]
    async fn test_broadcast_end_for_other_does_not_stop_self() {
        let session = Arc::new(FakeSession::default());
        let (notice_tx, _notice_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::spawn(
            session.clone(),
            notice_tx,
            CancellationToken::new(),
        );

        handle.broadcast_end("pov-9").await.expect("broadcast");
        assert_eq!(session.stop_count(), 0);
        assert_eq!(session.published.lock().len(), 1);

        handle.shutdown().await.expect("clean shutdown");
    }
}
