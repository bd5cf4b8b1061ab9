// WHIP publish proxy
//
// Browsers cannot attach the bearer stream key themselves, so the SDP offer
// is posted here and forwarded to the provisioned ingress endpoint with the
// POV's stored credentials. Upstream rejections pass through unchanged.
//
// Both routes are gated on identity: the stream key never leaves the server,
// so whoever can reach these handlers effectively controls the POV.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use povstream_core::models::{Pov, PovId, Room, UserId};

use super::{auth::AuthUser, AppError, AppResult, AppState};

/// Forward a WHIP SDP offer for a provisioned POV. Owner (or, for guest
/// POVs, the room host) only.
pub async fn publish(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(pov_id): Path<String>,
    body: String,
) -> AppResult<Response> {
    if body.trim().is_empty() {
        return Err(AppError::bad_request("Empty SDP offer"));
    }

    let pov_id = PovId::from_string(pov_id);
    let pov = authorized_pov(&state, &auth, &pov_id).await?;

    let (Some(server_url), Some(stream_key)) =
        (pov.server_url.as_deref(), pov.stream_key.as_deref())
    else {
        return Err(AppError::bad_request("POV has no WHIP ingress"));
    };

    match state.whip.publish(server_url, stream_key, body).await? {
        Ok(answer) => {
            if let Some(resource_url) = &answer.resource_url {
                state.povs.set_whip_resource(&pov_id, resource_url).await?;
            }
            tracing::info!(pov_id = %pov_id, "WHIP publish accepted");

            // Location points back at this proxy; the revoke DELETE must go
            // through it so the stored resource handle is cleared too.
            Ok((
                StatusCode::CREATED,
                [
                    (header::CONTENT_TYPE, "application/sdp".to_string()),
                    (header::LOCATION, format!("/api/whip/{pov_id}")),
                ],
                answer.sdp_answer,
            )
                .into_response())
        }
        Err(rejection) => {
            tracing::warn!(
                pov_id = %pov_id,
                status = rejection.status,
                "WHIP publish rejected upstream"
            );
            let status = StatusCode::from_u16(rejection.status)
                .unwrap_or(StatusCode::BAD_GATEWAY);
            Ok((status, rejection.body).into_response())
        }
    }
}

/// Revoke the upstream WHIP session of a POV. Owner (or room host) only.
pub async fn unpublish(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(pov_id): Path<String>,
) -> AppResult<StatusCode> {
    let pov_id = PovId::from_string(pov_id);
    authorized_pov(&state, &auth, &pov_id).await?;

    state.ingress.teardown(&pov_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Load the POV and reject callers who may not operate it.
async fn authorized_pov(
    state: &AppState,
    auth: &AuthUser,
    pov_id: &PovId,
) -> AppResult<Pov> {
    let pov = state
        .povs
        .get_by_id(pov_id)
        .await?
        .ok_or_else(|| AppError::not_found("POV not found"))?;

    let room = state
        .rooms
        .get_by_id(&pov.room_id)
        .await?
        .ok_or_else(|| AppError::not_found("Room not found"))?;

    if !may_operate(&pov, &room, auth.id()) {
        return Err(AppError::forbidden("Not your POV"));
    }

    Ok(pov)
}

/// A POV is operated by its owner; guest POVs (no owning user) fall to the
/// room host, who provisioned or admitted them.
fn may_operate(pov: &Pov, room: &Room, user_id: &UserId) -> bool {
    pov.is_owned_by(user_id) || room.is_hosted_by(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{create_router, AppState};
    use axum::body::Body;
    use axum::http::Request;
    use povstream_core::Config;
    use tower::ServiceExt;

    fn pov_in(room: &Room, owner: Option<UserId>) -> Pov {
        Pov::new(room.id.clone(), owner, "Camera A".to_string())
    }

    fn room_hosted_by(host: &UserId) -> Room {
        Room::new("Demo".to_string(), host.clone(), true)
    }

    #[test]
    fn test_owner_may_operate() {
        let host = UserId::new();
        let owner = UserId::new();
        let room = room_hosted_by(&host);
        let pov = pov_in(&room, Some(owner.clone()));

        assert!(may_operate(&pov, &room, &owner));
        assert!(!may_operate(&pov, &room, &UserId::new()));
    }

    #[test]
    fn test_host_may_operate_guest_pov() {
        let host = UserId::new();
        let room = room_hosted_by(&host);
        let guest_pov = pov_in(&room, None);

        assert!(may_operate(&guest_pov, &room, &host));
        assert!(!may_operate(&guest_pov, &room, &UserId::new()));
    }

    #[test]
    fn test_host_may_operate_member_pov() {
        let host = UserId::new();
        let room = room_hosted_by(&host);
        let pov = pov_in(&room, Some(UserId::new()));

        assert!(may_operate(&pov, &room, &host));
    }

    fn test_router() -> axum::Router {
        let pool = sqlx::PgPool::connect_lazy("postgresql://localhost/povstream")
            .expect("lazy pool");
        create_router(AppState::new(pool, &Config::default()))
    }

    // No identity header must be rejected before any POV lookup happens;
    // a lazy pool with no database behind it proves no query was attempted.
    #[tokio::test]
    async fn test_unpublish_rejects_anonymous_callers() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/whip/pov000000001")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_publish_rejects_anonymous_callers() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/whip/pov000000001")
                    .header("content-type", "application/sdp")
                    .body(Body::from("v=0 offer"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
