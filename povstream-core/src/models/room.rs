use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::id::{RoomId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    /// URL slug, globally unique and immutable after creation.
    pub slug: String,
    pub host_id: UserId,
    /// Shared secret gating who may provision a publishing POV.
    #[serde(skip_serializing)]
    pub join_code: String,
    pub chat_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(name: String, host_id: UserId, chat_enabled: bool) -> Self {
        let slug = slugify(&name);
        Self {
            id: RoomId::new(),
            name,
            slug,
            host_id,
            join_code: generate_join_code(),
            chat_enabled,
            created_at: Utc::now(),
        }
    }

    pub fn is_hosted_by(&self, user_id: &UserId) -> bool {
        self.host_id == *user_id
    }
}

/// Derive a URL slug from a room name: lowercase, whitespace collapsed to `-`.
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const JOIN_CODE_LEN: usize = 6;

/// Generate a six character join code from an unambiguous alphabet.
pub fn generate_join_code() -> String {
    let mut rng = rand::thread_rng();
    (0..JOIN_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..JOIN_CODE_ALPHABET.len());
            JOIN_CODE_ALPHABET[idx] as char
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default = "default_chat_enabled")]
    pub chat_enabled: bool,
}

const fn default_chat_enabled() -> bool {
    true
}
