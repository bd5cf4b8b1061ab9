use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{PovId, RoomId, UserId};

/// Ingress flavor requested when going live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressKind {
    /// Browser publish over WHIP, pass-through (no transcoding).
    BrowserWhip,
    /// External encoder over RTMP, transcoded with a fixed preset ladder.
    ExternalEncoderRtmp,
}

impl IngressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BrowserWhip => "whip",
            Self::ExternalEncoderRtmp => "rtmp",
        }
    }
}

/// One independently publishable media feed within a room.
///
/// Ingress credentials (`ingress_id`, `server_url`, `stream_key`) are present
/// only for externally-ingested POVs and are write-once until explicitly
/// reset. `whip_resource_url` is set once the upstream acknowledges a publish
/// and cleared on teardown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pov {
    pub id: PovId,
    pub room_id: RoomId,
    /// Owning user; `None` for guest/ingress-only POVs.
    pub user_id: Option<UserId>,
    pub label: String,
    pub ingress_id: Option<String>,
    pub server_url: Option<String>,
    #[serde(skip_serializing)]
    pub stream_key: Option<String>,
    pub whip_resource_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Pov {
    pub fn new(room_id: RoomId, user_id: Option<UserId>, label: String) -> Self {
        Self {
            id: PovId::new(),
            room_id,
            user_id,
            label,
            ingress_id: None,
            server_url: None,
            stream_key: None,
            whip_resource_url: None,
            created_at: Utc::now(),
        }
    }

    pub fn has_ingress(&self) -> bool {
        self.ingress_id.is_some()
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        self.user_id.as_ref() == Some(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pov_has_no_ingress() {
        let pov = Pov::new(RoomId::new(), Some(UserId::new()), "Camera A".to_string());
        assert!(!pov.has_ingress());
        assert!(pov.whip_resource_url.is_none());
    }

    #[test]
    fn test_ownership() {
        let owner = UserId::new();
        let pov = Pov::new(RoomId::new(), Some(owner.clone()), "cam".to_string());
        assert!(pov.is_owned_by(&owner));
        assert!(!pov.is_owned_by(&UserId::new()));

        let guest = Pov::new(RoomId::new(), None, "guest".to_string());
        assert!(!guest.is_owned_by(&owner));
    }
}
