//! Client-facing session coordination: a pure reducer over session events,
//! a coordinator task that executes its effects, and a liveness probe that
//! backstops lost room-deleted notifications.

pub mod coordinator;
pub mod event;
pub mod liveness;
pub mod state;

pub use coordinator::{RoomSession, SessionHandle, SessionNotice, RECOMPUTE_DEBOUNCE};
pub use event::{
    ControlMessage, ParticipantSnapshot, PublicationSnapshot, SessionEvent, SessionSnapshot,
    TrackKind, TARGET_ALL,
};
pub use liveness::{RoomLivenessProbe, PROBE_INTERVAL};
pub use state::{
    active_participants, resolve_label, Effect, ParticipantInfo, SessionState, Tile, DEFAULT_LABEL,
};
