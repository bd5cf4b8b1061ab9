use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    models::{generate_id, RoomId},
    Error, Result,
};

/// Role a session credential is minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenRole {
    Viewer,
    Publisher,
}

/// Grant block embedded in the session token, mirroring the provider's
/// video-grant claim shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoGrant {
    pub room: String,
    pub room_join: bool,
    pub can_subscribe: bool,
    pub can_publish: bool,
    pub can_publish_data: bool,
}

impl VideoGrant {
    fn for_role(room: &RoomId, role: TokenRole) -> Self {
        match role {
            TokenRole::Viewer => Self {
                room: room.as_str().to_string(),
                room_join: true,
                can_subscribe: true,
                can_publish: false,
                can_publish_data: false,
            },
            TokenRole::Publisher => Self {
                room: room.as_str().to_string(),
                room_join: true,
                can_subscribe: true,
                can_publish: true,
                can_publish_data: true,
            },
        }
    }
}

/// Session token claims accepted by the external session provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// API key identifying the tenant.
    pub iss: String,
    /// Participant identity.
    pub sub: String,
    /// Display name shown to other participants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub video: VideoGrant,
}

/// Mints scoped session credentials bound to a room and identity.
///
/// Tokens are short-lived and re-minted on every connect attempt; there is no
/// refresh or rotation.
#[derive(Clone)]
pub struct SessionTokenIssuer {
    api_key: String,
    encoding_key: Arc<EncodingKey>,
    ttl: Duration,
}

impl std::fmt::Debug for SessionTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenIssuer")
            .field("api_key", &self.api_key)
            .finish()
    }
}

impl SessionTokenIssuer {
    pub fn new(api_key: String, api_secret: &str, ttl_seconds: u64) -> Self {
        Self {
            api_key,
            encoding_key: Arc::new(EncodingKey::from_secret(api_secret.as_bytes())),
            ttl: Duration::seconds(ttl_seconds as i64),
        }
    }

    /// Issue a signed credential for the given room/identity/role triple.
    ///
    /// A missing identity (guest viewing) defaults to a freshly generated
    /// anonymous identifier.
    pub fn issue(
        &self,
        room: &RoomId,
        identity: Option<String>,
        name: Option<String>,
        role: TokenRole,
    ) -> Result<String> {
        let identity = identity.unwrap_or_else(anonymous_identity);
        let now = Utc::now();

        let claims = SessionClaims {
            iss: self.api_key.clone(),
            sub: identity,
            name,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            video: VideoGrant::for_role(room, role),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("Failed to sign session token: {e}")))
    }
}

fn anonymous_identity() -> String {
    format!("viewer-{}", generate_id())
}
