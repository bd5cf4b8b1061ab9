use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::UserId;

/// Local mirror of an identity-provider user record, kept in sync by the
/// inbound identity webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub avatar_url: String,
    /// The identity provider's user id.
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, avatar_url: String, external_id: String) -> Self {
        Self {
            id: UserId::new(),
            username,
            avatar_url,
            external_id,
            created_at: Utc::now(),
        }
    }
}
