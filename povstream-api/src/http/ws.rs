// Chat relay websocket
//
// One socket per client; a client may join several rooms over the same
// socket. Messages are persisted before fan-out so chat history and the
// live relay never disagree about what was said.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use povstream_core::{
    models::{generate_id, Message, RoomId},
    service::ChatEvent,
};

use super::{auth::AuthUser, AppState};

const MAX_MESSAGE_LENGTH: usize = 2000;

/// Client-to-server chat commands.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientCommand {
    JoinRoom { room_id: String },
    SendMessage { room_id: String, content: String },
    /// Host only: atomically delete the room and notify every member.
    DeleteRoom { room_id: String },
}

/// Server-to-client frames beyond relayed [`ChatEvent`]s.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame<'a> {
    Error { message: &'a str },
}

pub async fn chat_socket(
    auth: AuthUser,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, auth))
}

async fn handle_socket(socket: WebSocket, state: AppState, auth: AuthUser) {
    let connection_id = generate_id();
    let (mut sink, mut stream) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ChatEvent>();

    debug!(connection_id = %connection_id, user_id = %auth.id(), "Chat socket opened");

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let Ok(json) = serde_json::to_string(&event) else {
                    warn!("Failed to encode chat event");
                    continue;
                };
                if sink.send(WsMessage::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                let Some(Ok(message)) = incoming else { break };
                match message {
                    WsMessage::Text(text) => {
                        if let Some(error) =
                            handle_command(&state, &auth, &connection_id, &event_tx, text.as_str())
                                .await
                        {
                            let frame = ServerFrame::Error { message: &error };
                            let Ok(json) = serde_json::to_string(&frame) else { continue };
                            if sink.send(WsMessage::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    WsMessage::Close(_) => break,
                    // Pings are answered by axum; binary frames are ignored.
                    _ => {}
                }
            }
        }
    }

    state.chat_hub.leave(&connection_id);
    debug!(connection_id = %connection_id, "Chat socket closed");
}

/// Process one client command. Returns a user-facing error string for
/// rejected commands; protocol-level problems just drop the frame.
async fn handle_command(
    state: &AppState,
    auth: &AuthUser,
    connection_id: &str,
    event_tx: &mpsc::UnboundedSender<ChatEvent>,
    text: &str,
) -> Option<String> {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed chat command");
            return None;
        }
    };

    match command {
        ClientCommand::JoinRoom { room_id } => {
            let room_id = RoomId::from_string(room_id);
            match state.rooms.exists(&room_id).await {
                Ok(true) => {
                    state
                        .chat_hub
                        .join(room_id, connection_id.to_string(), event_tx.clone());
                    None
                }
                Ok(false) => Some("Room not found".to_string()),
                Err(e) => {
                    warn!(error = %e, "Room lookup failed during chat join");
                    Some("Room lookup failed".to_string())
                }
            }
        }
        ClientCommand::SendMessage { room_id, content } => {
            let content = content.trim();
            if content.is_empty() {
                return Some("Message cannot be empty".to_string());
            }
            if content.len() > MAX_MESSAGE_LENGTH {
                return Some("Message is too long".to_string());
            }

            let room_id = RoomId::from_string(room_id);
            let room = match state.rooms.get_by_id(&room_id).await {
                Ok(Some(room)) => room,
                Ok(None) => return Some("Room not found".to_string()),
                Err(e) => {
                    warn!(error = %e, "Room lookup failed during chat send");
                    return Some("Room lookup failed".to_string());
                }
            };
            if !room.chat_enabled {
                return Some("Chat is disabled in this room".to_string());
            }

            let message = Message::new(
                room_id.clone(),
                auth.id().clone(),
                auth.user.username.clone(),
                content.to_string(),
            );

            // Persist first, relay second.
            let message = match state.messages.create(&message).await {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Failed to persist chat message");
                    return Some("Failed to send message".to_string());
                }
            };

            state
                .chat_hub
                .send(&room_id, connection_id, &ChatEvent::NewMessage { message });
            None
        }
        ClientCommand::DeleteRoom { room_id } => {
            let room_id = RoomId::from_string(room_id);
            let room = match state.rooms.get_by_id(&room_id).await {
                Ok(Some(room)) => room,
                Ok(None) => return Some("Room not found".to_string()),
                Err(e) => {
                    warn!(error = %e, "Room lookup failed during chat delete");
                    return Some("Room lookup failed".to_string());
                }
            };
            if !room.is_hosted_by(auth.id()) {
                return Some("Only the host may delete a room".to_string());
            }

            match state.rooms.delete_cascade(&room_id).await {
                Ok(_) => {
                    // Everyone is notified, the deleting host included.
                    let notified = state.chat_hub.broadcast(
                        &room_id,
                        &ChatEvent::RoomDeleted {
                            room_id: room_id.clone(),
                        },
                    );
                    info!(room_id = %room_id, notified, "Room deleted over chat channel");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Failed to delete room");
                    Some("Failed to delete room".to_string())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_command_wire_shape() {
        let join: ClientCommand =
            serde_json::from_str(r#"{"type":"join_room","room_id":"r1"}"#).expect("parse");
        assert!(matches!(join, ClientCommand::JoinRoom { .. }));

        let send: ClientCommand = serde_json::from_str(
            r#"{"type":"send_message","room_id":"r1","content":"hi"}"#,
        )
        .expect("parse");
        match send {
            ClientCommand::SendMessage { room_id, content } => {
                assert_eq!(room_id, "r1");
                assert_eq!(content, "hi");
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let delete: ClientCommand =
            serde_json::from_str(r#"{"type":"delete_room","room_id":"r1"}"#).expect("parse");
        assert!(matches!(delete, ClientCommand::DeleteRoom { .. }));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let parsed: Result<ClientCommand, _> =
            serde_json::from_str(r#"{"type":"dance","room_id":"r1"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_server_event_wire_shape() {
        let event = ChatEvent::RoomDeleted {
            room_id: RoomId::from_string("r1".to_string()),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "room_deleted");
        assert_eq!(json["room_id"], "r1");
    }
}
