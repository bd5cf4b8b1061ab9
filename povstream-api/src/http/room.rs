// Room management HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use povstream_core::{
    models::{CreateRoomRequest, Pov, Room, RoomId},
    service::ChatEvent,
};

use super::{auth::AuthUser, AppError, AppResult, AppState};

const ROOM_HISTORY_LIMIT: i64 = 100;

/// Room response. `join_code` is present only for the host.
#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub host_id: String,
    pub chat_enabled: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
}

impl RoomResponse {
    fn from_room(room: &Room, include_join_code: bool) -> Self {
        Self {
            id: room.id.as_str().to_string(),
            name: room.name.clone(),
            slug: room.slug.clone(),
            host_id: room.host_id.as_str().to_string(),
            chat_enabled: room.chat_enabled,
            created_at: room.created_at.to_rfc3339(),
            join_code: include_join_code.then(|| room.join_code.clone()),
        }
    }
}

/// Room detail returned to the room page: the room plus its POVs and
/// recent chat history.
#[derive(Debug, Serialize)]
pub struct RoomDetailResponse {
    pub room: RoomResponse,
    pub povs: Vec<Pov>,
    pub messages: Vec<povstream_core::models::Message>,
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

/// Create a new room hosted by the caller
pub async fn create_room(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> AppResult<(StatusCode, Json<RoomResponse>)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Room name cannot be empty"));
    }
    if name.len() > 100 {
        return Err(AppError::bad_request("Room name is too long"));
    }

    let room = state
        .rooms
        .create(&Room::new(
            name.to_string(),
            auth.id().clone(),
            req.chat_enabled,
        ))
        .await?;

    tracing::info!(room_id = %room.id, host_id = %auth.id(), "Room created");

    Ok((
        StatusCode::CREATED,
        Json(RoomResponse::from_room(&room, true)),
    ))
}

/// List rooms hosted by the caller, newest first
pub async fn list_my_rooms(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<RoomResponse>>> {
    let rooms = state.rooms.list_by_host(auth.id()).await?;
    Ok(Json(
        rooms
            .iter()
            .map(|room| RoomResponse::from_room(room, true))
            .collect(),
    ))
}

/// Fetch a room by its URL slug, with POVs and recent chat history
pub async fn get_room_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<RoomDetailResponse>> {
    let room = state
        .rooms
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::not_found("Room not found"))?;

    let povs = state.povs.list_by_room(&room.id).await?;
    let messages = if room.chat_enabled {
        state
            .messages
            .list_by_room(&room.id, ROOM_HISTORY_LIMIT)
            .await?
    } else {
        Vec::new()
    };

    Ok(Json(RoomDetailResponse {
        room: RoomResponse::from_room(&room, false),
        povs,
        messages,
    }))
}

/// Existence probe used by connected clients as a deletion backstop.
/// Returns 200 while the room exists and 404 once it is gone.
pub async fn room_exists(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<Json<ExistsResponse>> {
    let room_id = RoomId::from_string(room_id);
    if state.rooms.exists(&room_id).await? {
        Ok(Json(ExistsResponse { exists: true }))
    } else {
        Err(AppError::not_found("Room not found"))
    }
}

/// Delete a room with all its POVs and messages. Host only.
///
/// Connected chat members are notified before the handler returns; clients
/// in the media session learn about the deletion from the data channel or
/// their existence probe.
pub async fn delete_room(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<StatusCode> {
    let room_id = RoomId::from_string(room_id);
    let room = state
        .rooms
        .get_by_id(&room_id)
        .await?
        .ok_or_else(|| AppError::not_found("Room not found"))?;

    if !room.is_hosted_by(auth.id()) {
        return Err(AppError::forbidden("Only the host may delete a room"));
    }

    let deleted = state.rooms.delete_cascade(&room_id).await?;
    if !deleted {
        return Err(AppError::not_found("Room not found"));
    }

    let notified = state.chat_hub.broadcast(
        &room_id,
        &ChatEvent::RoomDeleted {
            room_id: room_id.clone(),
        },
    );
    tracing::info!(room_id = %room_id, notified, "Room deleted");

    Ok(StatusCode::NO_CONTENT)
}
