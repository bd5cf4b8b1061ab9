use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{Message, MessageId, RoomId, UserId},
    Result,
};

/// Message repository for database operations
#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a chat message. Messages are immutable once created.
    pub async fn create(&self, message: &Message) -> Result<Message> {
        let row = sqlx::query(
            "INSERT INTO messages (id, room_id, sender_id, username, content, sent_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, room_id, sender_id, username, content, sent_at",
        )
        .bind(message.id.as_str())
        .bind(message.room_id.as_str())
        .bind(message.sender_id.as_str())
        .bind(&message.username)
        .bind(&message.content)
        .bind(message.sent_at)
        .fetch_one(&self.pool)
        .await?;

        row_to_message(&row)
    }

    /// Fetch the most recent messages of a room in send order
    pub async fn list_by_room(&self, room_id: &RoomId, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, room_id, sender_id, username, content, sent_at
             FROM (
                 SELECT id, room_id, sender_id, username, content, sent_at
                 FROM messages
                 WHERE room_id = $1
                 ORDER BY sent_at DESC
                 LIMIT $2
             ) recent
             ORDER BY sent_at ASC",
        )
        .bind(room_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }
}

/// Convert database row to Message model
fn row_to_message(row: &PgRow) -> Result<Message> {
    Ok(Message {
        id: MessageId::from_string(row.try_get("id")?),
        room_id: RoomId::from_string(row.try_get("room_id")?),
        sender_id: UserId::from_string(row.try_get("sender_id")?),
        username: row.try_get("username")?,
        content: row.try_get("content")?,
        sent_at: row.try_get("sent_at")?,
    })
}
