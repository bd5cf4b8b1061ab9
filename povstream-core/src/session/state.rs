use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::event::{
    ControlMessage, ParticipantSnapshot, PublicationSnapshot, SessionEvent, SessionSnapshot,
    TrackKind, TARGET_ALL,
};

/// Label used when participant metadata is absent or malformed.
pub const DEFAULT_LABEL: &str = "POV";

/// One renderable video track publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Publication sid this tile renders.
    pub sid: String,
    pub participant_identity: String,
    pub label: String,
    pub is_local: bool,
}

/// Derived view of a participant with at least one live, enabled, unmuted
/// track. Never persisted; always a projection of the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub identity: String,
    pub name: String,
    pub is_local: bool,
    pub is_speaking: bool,
}

/// Side effects requested by the reducer; executed by the coordinator task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Stop and unpublish all local track publications.
    StopLocalTracks,
    /// Tell the host application its publish session ended.
    NotifyStreamEnded,
    /// Surface a user-visible notice without touching local state.
    Notice(String),
    /// The room is gone; the client should navigate away.
    LeaveRoom,
    /// Request a debounced projection recompute.
    ScheduleRecompute,
}

#[derive(Debug, Clone)]
struct ParticipantMeta {
    metadata: Option<String>,
}

/// Local projection of a connected room session: tiles keyed by publication
/// sid plus the active-participant set.
///
/// Both projections are derivable purely from a `SessionSnapshot`; event
/// handling never applies incremental deltas on top of assumed prior state,
/// so recomputation is idempotent under out-of-order delivery.
#[derive(Debug, Default)]
pub struct SessionState {
    tiles: HashMap<String, Tile>,
    participants: Vec<ParticipantInfo>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tiles in deterministic (sid) order.
    pub fn tiles(&self) -> Vec<Tile> {
        let mut tiles: Vec<Tile> = self.tiles.values().cloned().collect();
        tiles.sort_by(|a, b| a.sid.cmp(&b.sid));
        tiles
    }

    pub fn participants(&self) -> &[ParticipantInfo] {
        &self.participants
    }

    /// Apply one session event. `local_identity` is the identity this client
    /// connected as; `snapshot` is the current authoritative session view.
    pub fn apply(
        &mut self,
        event: SessionEvent,
        local_identity: &str,
        snapshot: &SessionSnapshot,
    ) -> Vec<Effect> {
        match event {
            SessionEvent::LocalTrackPublished {
                participant,
                publication,
            }
            | SessionEvent::RemoteTrackSubscribed {
                participant,
                publication,
            } => {
                self.upsert_tile(&participant, &publication);
                self.recompute(snapshot);
                Vec::new()
            }
            SessionEvent::LocalTrackUnpublished { sid }
            | SessionEvent::RemoteTrackUnsubscribed { sid } => {
                // Removal is idempotent; an absent sid is a no-op.
                self.tiles.remove(&sid);
                self.recompute(snapshot);
                Vec::new()
            }
            SessionEvent::ParticipantMetadataChanged { identity, metadata } => {
                let label = resolve_label(metadata.as_deref());
                for tile in self.tiles.values_mut() {
                    if tile.participant_identity == identity {
                        tile.label = label.clone();
                    }
                }
                Vec::new()
            }
            SessionEvent::ParticipantConnected
            | SessionEvent::ParticipantDisconnected
            | SessionEvent::TrackPublished
            | SessionEvent::TrackUnpublished
            | SessionEvent::TrackMuted
            | SessionEvent::TrackUnmuted
            | SessionEvent::SpeakingChanged => {
                self.recompute(snapshot);
                Vec::new()
            }
            SessionEvent::DataReceived { payload } => {
                self.handle_data(&payload, local_identity)
            }
        }
    }

    /// Rebuild the active-participant projection wholesale from the
    /// snapshot. Pure in the snapshot: the same session state always yields
    /// the same projection regardless of the event order that produced it.
    pub fn recompute(&mut self, snapshot: &SessionSnapshot) {
        self.participants = active_participants(snapshot);
        // Drop tiles whose publication no longer exists in the session.
        let live_sids: std::collections::HashSet<&str> = snapshot
            .participants
            .iter()
            .flat_map(|p| p.publications.iter())
            .map(|p| p.sid.as_str())
            .collect();
        self.tiles.retain(|sid, _| live_sids.contains(sid.as_str()));
    }

    fn upsert_tile(&mut self, participant: &ParticipantSnapshot, publication: &PublicationSnapshot) {
        // Audio-only publications never produce a tile; they are only
        // consulted for the active-participant determination.
        if publication.kind != TrackKind::Video {
            return;
        }

        let tile = Tile {
            sid: publication.sid.clone(),
            participant_identity: participant.identity.clone(),
            label: resolve_label(participant.metadata.as_deref()),
            is_local: participant.is_local,
        };
        self.tiles.insert(publication.sid.clone(), tile);
    }

    /// Handle a data-channel payload. A bad payload is logged and dropped;
    /// it must never abort the per-connection event loop.
    fn handle_data(&mut self, payload: &[u8], local_identity: &str) -> Vec<Effect> {
        let message: ControlMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Ignoring malformed data-channel payload");
                return Vec::new();
            }
        };

        match message {
            ControlMessage::EndStream { target } => {
                let targets_me = target == local_identity || target == TARGET_ALL;
                // Bursts of end-stream messages coalesce into one recompute.
                if targets_me {
                    vec![
                        Effect::StopLocalTracks,
                        Effect::NotifyStreamEnded,
                        Effect::ScheduleRecompute,
                    ]
                } else {
                    // The targeted participant's own client self-stops; we
                    // only surface a notice.
                    vec![
                        Effect::Notice(format!("{target}'s stream has ended.")),
                        Effect::ScheduleRecompute,
                    ]
                }
            }
            ControlMessage::RoomDeleted => vec![
                Effect::Notice("This room has been deleted.".to_string()),
                Effect::LeaveRoom,
            ],
        }
    }
}

/// Resolve a display label from participant metadata: a JSON blob with an
/// optional `povLabel` field. Absent or malformed metadata falls back to
/// [`DEFAULT_LABEL`].
pub fn resolve_label(metadata: Option<&str>) -> String {
    let Some(raw) = metadata else {
        return DEFAULT_LABEL.to_string();
    };

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => value
            .get("povLabel")
            .and_then(|v| v.as_str())
            .map_or_else(|| DEFAULT_LABEL.to_string(), str::to_string),
        Err(e) => {
            debug!(error = %e, "Malformed participant metadata, using default label");
            DEFAULT_LABEL.to_string()
        }
    }
}

/// Compute the active-participant projection for a snapshot: a participant
/// is included iff they have at least one live, enabled, unmuted track of
/// either kind. Zero qualifying tracks excludes them entirely.
pub fn active_participants(snapshot: &SessionSnapshot) -> Vec<ParticipantInfo> {
    snapshot
        .participants
        .iter()
        .filter(|p| p.has_active_tracks())
        .map(|p| ParticipantInfo {
            identity: p.identity.clone(),
            name: p
                .name
                .clone()
                .unwrap_or_else(|| resolve_label(p.metadata.as_deref())),
            is_local: p.is_local,
            is_speaking: p.is_speaking,
        })
        .collect()
}
