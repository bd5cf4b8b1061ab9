use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::RoomId;

use super::event::{ControlMessage, SessionEvent};

/// Interval between room-existence probes.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(3);

/// Polls the control plane for room existence while a session is connected.
///
/// Backstop for the data-channel `room-deleted` message: if that message is
/// lost (e.g. the room was deleted while this client was reconnecting), the
/// probe notices the 404 and injects the same control message into the
/// coordinator's event feed, so deletion is handled by one code path.
pub struct RoomLivenessProbe {
    http: reqwest::Client,
    base_url: String,
}

impl RoomLivenessProbe {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Run until the room disappears or `cancel` fires. Transport errors are
    /// logged and retried on the next tick; only a definitive 404 ends the
    /// probe.
    pub async fn run(
        self,
        room_id: RoomId,
        events: mpsc::UnboundedSender<SessionEvent>,
        cancel: CancellationToken,
    ) {
        let url = format!(
            "{}/api/rooms/{}/exists",
            self.base_url.trim_end_matches('/'),
            room_id
        );
        let mut interval = tokio::time::interval(PROBE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(room_id = %room_id, "Room liveness probe stopping");
                    return;
                }
                _ = interval.tick() => {}
            }

            match self.http.get(&url).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                    warn!(room_id = %room_id, "Room no longer exists, injecting room-deleted");
                    let payload = match serde_json::to_vec(&ControlMessage::RoomDeleted) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode room-deleted message");
                            return;
                        }
                    };
                    let _ = events.send(SessionEvent::DataReceived { payload });
                    return;
                }
                Ok(response) if !response.status().is_success() => {
                    debug!(
                        room_id = %room_id,
                        status = %response.status(),
                        "Unexpected liveness probe status, retrying"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(room_id = %room_id, error = %e, "Liveness probe failed, retrying");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_injects_room_deleted_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/rooms/.+/exists$"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let probe = RoomLivenessProbe::new(server.uri());
        probe
            .run(RoomId::new(), tx, CancellationToken::new())
            .await;

        let Some(SessionEvent::DataReceived { payload }) = rx.recv().await else {
            panic!("expected a data event");
        };
        let message: ControlMessage = serde_json::from_slice(&payload).expect("valid message");
        assert_eq!(message, ControlMessage::RoomDeleted);
    }

    #[tokio::test]
    async fn test_probe_stops_on_cancellation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let probe = RoomLivenessProbe::new(server.uri());
        probe.run(RoomId::new(), tx, cancel).await;
        assert!(rx.try_recv().is_err());
    }
}
