use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::models::{Message, RoomId};

/// Handle for a client connection subscription
pub type ConnectionId = String;

/// Message sender for a client connection
pub type EventSender = mpsc::UnboundedSender<ChatEvent>;

/// Events fanned out to room members over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    NewMessage { message: Message },
    RoomDeleted { room_id: RoomId },
}

#[derive(Debug, Clone)]
struct Member {
    connection_id: ConnectionId,
    sender: EventSender,
}

/// In-memory fan-out of chat events keyed by room id.
///
/// Delivery is at-most-once with no persistence or replay; persisting the
/// message is a separate write done by the caller before relaying. Per-sender
/// ordering follows send order; cross-sender interleaving is arrival order.
#[derive(Clone, Default)]
pub struct ChatHub {
    /// room_id -> members of that room's broadcast group
    rooms: Arc<DashMap<RoomId, Vec<Member>>>,
    /// connection_id -> rooms it joined, for cleanup on disconnect
    memberships: Arc<DashMap<ConnectionId, Vec<RoomId>>>,
}

impl ChatHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a connection with a room-scoped broadcast group.
    /// Idempotent; a connection may belong to multiple rooms.
    pub fn join(&self, room_id: RoomId, connection_id: ConnectionId, sender: EventSender) {
        let mut members = self.rooms.entry(room_id.clone()).or_default();
        if members.iter().any(|m| m.connection_id == connection_id) {
            return;
        }
        members.push(Member {
            connection_id: connection_id.clone(),
            sender,
        });
        drop(members);

        self.memberships
            .entry(connection_id.clone())
            .or_default()
            .push(room_id.clone());

        debug!(room_id = %room_id, connection_id = %connection_id, "Joined room group");
    }

    /// Remove a connection from every group it joined.
    pub fn leave(&self, connection_id: &str) {
        let Some((_, rooms)) = self.memberships.remove(connection_id) else {
            return;
        };

        for room_id in rooms {
            if let Some(mut members) = self.rooms.get_mut(&room_id) {
                members.retain(|m| m.connection_id != connection_id);
                if members.is_empty() {
                    drop(members);
                    self.rooms.remove(&room_id);
                }
            }
        }

        debug!(connection_id = %connection_id, "Left all room groups");
    }

    /// Deliver an event to every member of the room except the sender.
    /// Returns the number of members reached.
    pub fn send(&self, room_id: &RoomId, sender_connection: &str, event: &ChatEvent) -> usize {
        self.fan_out(room_id, Some(sender_connection), event)
    }

    /// Deliver an event to every member of the room, the sender included
    /// (used for room-deleted notices).
    pub fn broadcast(&self, room_id: &RoomId, event: &ChatEvent) -> usize {
        self.fan_out(room_id, None, event)
    }

    fn fan_out(&self, room_id: &RoomId, exclude: Option<&str>, event: &ChatEvent) -> usize {
        let mut sent = 0;
        let mut dead = Vec::new();

        if let Some(members) = self.rooms.get(room_id) {
            for member in members.iter() {
                if exclude == Some(member.connection_id.as_str()) {
                    continue;
                }
                match member.sender.send(event.clone()) {
                    Ok(()) => sent += 1,
                    Err(_) => {
                        warn!(
                            room_id = %room_id,
                            connection_id = %member.connection_id,
                            "Dropping dead chat connection"
                        );
                        dead.push(member.connection_id.clone());
                    }
                }
            }
        }

        for connection_id in dead {
            self.leave(&connection_id);
        }

        sent
    }

    pub fn member_count(&self, room_id: &RoomId) -> usize {
        self.rooms.get(room_id).map_or(0, |m| m.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageId, UserId};
    use chrono::Utc;

    fn message(room_id: &RoomId) -> Message {
        Message {
            id: MessageId::new(),
            room_id: room_id.clone(),
            sender_id: UserId::new(),
            username: "alice".to_string(),
            content: "hello".to_string(),
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_send_skips_the_sender() {
        let hub = ChatHub::new();
        let room = RoomId::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.join(room.clone(), "conn1".to_string(), tx1);
        hub.join(room.clone(), "conn2".to_string(), tx2);

        let event = ChatEvent::NewMessage {
            message: message(&room),
        };
        let sent = hub.send(&room, "conn1", &event);
        assert_eq!(sent, 1);

        assert!(rx2.recv().await.is_some());
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let hub = ChatHub::new();
        let room = RoomId::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.join(room.clone(), "conn1".to_string(), tx1);
        hub.join(room.clone(), "conn2".to_string(), tx2);

        let sent = hub.broadcast(
            &room,
            &ChatEvent::RoomDeleted {
                room_id: room.clone(),
            },
        );
        assert_eq!(sent, 2);
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[test]
    fn test_join_is_idempotent() {
        let hub = ChatHub::new();
        let room = RoomId::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        hub.join(room.clone(), "conn1".to_string(), tx.clone());
        hub.join(room.clone(), "conn1".to_string(), tx);
        assert_eq!(hub.member_count(&room), 1);
    }

    #[test]
    fn test_leave_cleans_every_room() {
        let hub = ChatHub::new();
        let room_a = RoomId::new();
        let room_b = RoomId::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        hub.join(room_a.clone(), "conn1".to_string(), tx.clone());
        hub.join(room_b.clone(), "conn1".to_string(), tx);

        hub.leave("conn1");
        assert_eq!(hub.member_count(&room_a), 0);
        assert_eq!(hub.member_count(&room_b), 0);
    }

    #[test]
    fn test_send_to_empty_room_is_noop() {
        let hub = ChatHub::new();
        let room = RoomId::new();
        let event = ChatEvent::RoomDeleted {
            room_id: room.clone(),
        };
        assert_eq!(hub.broadcast(&room, &event), 0);
    }
}
