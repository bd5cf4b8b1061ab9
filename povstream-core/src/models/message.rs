use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{MessageId, RoomId, UserId};

/// A persisted chat message. Immutable once created, ordered by `sent_at`
/// within a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub username: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn new(room_id: RoomId, sender_id: UserId, username: String, content: String) -> Self {
        Self {
            id: MessageId::new(),
            room_id,
            sender_id,
            username,
            content,
            sent_at: Utc::now(),
        }
    }
}
