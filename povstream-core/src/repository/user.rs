use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{User, UserId},
    Result,
};

const USER_COLUMNS: &str = "id, username, avatar_url, external_id, created_at";

/// User repository, kept in sync with the identity provider via webhook
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user: &User) -> Result<User> {
        let row = sqlx::query(&format!(
            "INSERT INTO users (id, username, avatar_url, external_id, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id.as_str())
        .bind(&user.username)
        .bind(&user.avatar_url)
        .bind(&user.external_id)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?;

        row_to_user(&row)
    }

    pub async fn get_by_id(&self, user_id: &UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    pub async fn get_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    /// Update the mirrored profile fields for an identity-provider record.
    /// A no-op when no local row exists for that external id.
    pub async fn update_by_external_id(
        &self,
        external_id: &str,
        username: &str,
        avatar_url: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET username = $2, avatar_url = $3 WHERE external_id = $1")
            .bind(external_id)
            .bind(username)
            .bind(avatar_url)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Remove the local mirror when the identity provider deletes the user.
    /// A no-op when no local row exists.
    pub async fn delete_by_external_id(&self, external_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE external_id = $1")
            .bind(external_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Convert database row to User model
fn row_to_user(row: &PgRow) -> Result<User> {
    Ok(User {
        id: UserId::from_string(row.try_get("id")?),
        username: row.try_get("username")?,
        avatar_url: row.try_get("avatar_url")?,
        external_id: row.try_get("external_id")?,
        created_at: row.try_get("created_at")?,
    })
}
