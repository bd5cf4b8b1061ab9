use crate::{models::RoomId, repository::RoomRepository, Result};

/// Validates a presented join code against a room before a new publishing
/// POV may be provisioned.
///
/// Fails closed: a missing room yields `Ok(false)`, never an error.
#[derive(Clone)]
pub struct JoinGate {
    rooms: RoomRepository,
}

impl JoinGate {
    #[must_use]
    pub const fn new(rooms: RoomRepository) -> Self {
        Self { rooms }
    }

    pub async fn verify(&self, room_id: &RoomId, presented: &str) -> Result<bool> {
        let stored = self.rooms.get_join_code(room_id).await?;
        Ok(codes_match(stored.as_deref(), presented))
    }
}

/// Exact string comparison against the stored code; `None` (room not found)
/// never matches.
fn codes_match(stored: Option<&str>, presented: &str) -> bool {
    match stored {
        Some(code) => code == presented,
        None => false,
    }
}
