// Request identity extraction
//
// Authentication itself happens at the edge (the identity provider fronts
// this service); handlers trust the forwarded `x-user-id` header and only
// check that the referenced user is mirrored locally.

use axum::{extract::FromRequestParts, http::request::Parts};

use povstream_core::models::{User, UserId};

use super::{AppError, AppState};

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated user, resolved against the local user mirror.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

impl AuthUser {
    pub fn id(&self) -> &UserId {
        &self.user.id
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = extract_user_id(parts)
            .ok_or_else(|| AppError::unauthorized("Missing user identity"))?;

        let user = state
            .users
            .get_by_id(&user_id)
            .await?
            .ok_or_else(|| AppError::unauthorized("Unknown user"))?;

        Ok(Self { user })
    }
}

/// Identity that may be absent (guest viewers).
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(user_id) = extract_user_id(parts) else {
            return Ok(Self(None));
        };

        let user = state.users.get_by_id(&user_id).await?;
        Ok(Self(user.map(|user| AuthUser { user })))
    }
}

fn extract_user_id(parts: &Parts) -> Option<UserId> {
    parts
        .headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| UserId::from_string(v.to_string()))
}
