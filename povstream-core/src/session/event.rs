use serde::{Deserialize, Serialize};

/// Wildcard target for control messages addressed to every participant.
pub const TARGET_ALL: &str = "*";

/// Media kind of a track publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Point-in-time view of one track publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationSnapshot {
    /// Publication sid, unique within the session.
    pub sid: String,
    pub kind: TrackKind,
    pub muted: bool,
    /// Underlying media track is live (not ended).
    pub live: bool,
    pub enabled: bool,
}

impl PublicationSnapshot {
    /// A publication qualifies a participant as active when its track is
    /// live, enabled and not muted.
    pub fn is_active(&self) -> bool {
        self.live && self.enabled && !self.muted
    }
}

/// Point-in-time view of one participant and their publications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSnapshot {
    pub identity: String,
    pub name: Option<String>,
    /// Out-of-band metadata blob, expected to be JSON with an optional
    /// `povLabel` field.
    pub metadata: Option<String>,
    pub is_local: bool,
    pub is_speaking: bool,
    pub publications: Vec<PublicationSnapshot>,
}

impl ParticipantSnapshot {
    pub fn has_active_tracks(&self) -> bool {
        let has_audio = self
            .publications
            .iter()
            .any(|p| p.kind == TrackKind::Audio && p.is_active());
        let has_video = self
            .publications
            .iter()
            .any(|p| p.kind == TrackKind::Video && p.is_active());
        has_audio || has_video
    }
}

/// Point-in-time view of the whole connected session, local participant
/// included. Always the authority the projections are rebuilt from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub participants: Vec<ParticipantSnapshot>,
}

impl SessionSnapshot {
    pub fn local(&self) -> Option<&ParticipantSnapshot> {
        self.participants.iter().find(|p| p.is_local)
    }
}

/// Control messages exchanged over the session's reliable data channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    EndStream { target: String },
    RoomDeleted,
}

impl ControlMessage {
    pub fn end_stream(target: impl Into<String>) -> Self {
        Self::EndStream {
            target: target.into(),
        }
    }
}

/// Events observed from the external session's event stream. Treated as an
/// unordered-but-causally-consistent feed; every handler must stay correct
/// under out-of-order delivery.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    LocalTrackPublished {
        participant: ParticipantSnapshot,
        publication: PublicationSnapshot,
    },
    LocalTrackUnpublished {
        sid: String,
    },
    RemoteTrackSubscribed {
        participant: ParticipantSnapshot,
        publication: PublicationSnapshot,
    },
    RemoteTrackUnsubscribed {
        sid: String,
    },
    ParticipantMetadataChanged {
        identity: String,
        metadata: Option<String>,
    },
    ParticipantConnected,
    ParticipantDisconnected,
    TrackPublished,
    TrackUnpublished,
    TrackMuted,
    TrackUnmuted,
    SpeakingChanged,
    /// Raw payload received over the data channel.
    DataReceived {
        payload: Vec<u8>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_wire_shape() {
        let msg = ControlMessage::end_stream("*");
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["type"], "end-stream");
        assert_eq!(json["target"], "*");

        let deleted = serde_json::to_value(ControlMessage::RoomDeleted).expect("serialize");
        assert_eq!(deleted["type"], "room-deleted");

        let parsed: ControlMessage =
            serde_json::from_str(r#"{"type":"end-stream","target":"pov-1"}"#).expect("parse");
        assert_eq!(parsed, ControlMessage::end_stream("pov-1"));
    }

    #[test]
    fn test_muted_publication_is_not_active() {
        let publication = PublicationSnapshot {
            sid: "TR_1".to_string(),
            kind: TrackKind::Video,
            muted: true,
            live: true,
            enabled: true,
        };
        assert!(!publication.is_active());
    }

    #[test]
    fn test_either_media_kind_qualifies() {
        let audio_only = ParticipantSnapshot {
            identity: "a".to_string(),
            name: None,
            metadata: None,
            is_local: false,
            is_speaking: false,
            publications: vec![PublicationSnapshot {
                sid: "TR_A".to_string(),
                kind: TrackKind::Audio,
                muted: false,
                live: true,
                enabled: true,
            }],
        };
        assert!(audio_only.has_active_tracks());
    }
}
