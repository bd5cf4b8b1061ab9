// Going live: join-code gating, ingress provisioning and token minting

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use povstream_core::{
    models::{IngressKind, RoomId},
    service::TokenRole,
};

use super::{auth::MaybeAuthUser, AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct GoLiveRequest {
    pub join_code: String,
    pub kind: IngressKind,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GoLiveResponse {
    pub pov_id: String,
    pub ingress_id: String,
    /// WHIP or RTMP endpoint to push media to.
    pub endpoint_url: String,
    /// Present for RTMP ingress only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_key: Option<String>,
    /// Publisher session token bound to the POV identity.
    pub token: String,
    pub ws_url: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub ws_url: String,
}

/// Provision an ingress endpoint and mint a publisher credential for a new
/// POV. Gated by the room's join code; works for guests and members alike.
pub async fn go_live(
    auth: MaybeAuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<GoLiveRequest>,
) -> AppResult<(StatusCode, Json<GoLiveResponse>)> {
    let room_id = RoomId::from_string(room_id);

    if !state.join_gate.verify(&room_id, &req.join_code).await? {
        return Err(AppError::bad_request("Invalid join code"));
    }

    let label = req
        .label
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(povstream_core::session::DEFAULT_LABEL)
        .to_string();
    if label.len() > 50 {
        return Err(AppError::bad_request("Label is too long"));
    }

    let user_id = auth.0.as_ref().map(|a| a.id().clone());
    let name = auth.0.as_ref().map(|a| a.user.username.clone());

    let provisioned = state
        .ingress
        .provision(req.kind, &room_id, user_id, label)
        .await?;

    let token = state.tokens.issue(
        &room_id,
        Some(provisioned.pov_id.as_str().to_string()),
        name,
        TokenRole::Publisher,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(GoLiveResponse {
            pov_id: provisioned.pov_id.as_str().to_string(),
            ingress_id: provisioned.ingress_id,
            endpoint_url: provisioned.endpoint_url,
            stream_key: provisioned.stream_key,
            token,
            ws_url: state.ws_url.clone(),
        }),
    ))
}

/// Mint a session credential for joining a room. Hosts receive publisher
/// grants (they moderate over the data channel); everyone else views only.
pub async fn mint_token(
    auth: MaybeAuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let room_id = RoomId::from_string(room_id);
    let room = state
        .rooms
        .get_by_id(&room_id)
        .await?
        .ok_or_else(|| AppError::not_found("Room not found"))?;

    let (identity, name, role) = match &auth.0 {
        Some(auth_user) => {
            let role = if room.is_hosted_by(auth_user.id()) {
                TokenRole::Publisher
            } else {
                TokenRole::Viewer
            };
            (
                Some(auth_user.id().as_str().to_string()),
                req.name.or_else(|| Some(auth_user.user.username.clone())),
                role,
            )
        }
        // Anonymous viewers get a generated identity inside the issuer.
        None => (None, req.name, TokenRole::Viewer),
    };

    let token = state.tokens.issue(&room_id, identity, name, role)?;

    Ok(Json(TokenResponse {
        token,
        ws_url: state.ws_url.clone(),
    }))
}
