use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{Pov, PovId, RoomId, UserId},
    Result,
};

const POV_COLUMNS: &str =
    "id, room_id, user_id, label, ingress_id, server_url, stream_key, whip_resource_url, created_at";

/// POV repository for database operations
#[derive(Clone)]
pub struct PovRepository {
    pool: PgPool,
}

impl PovRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new POV row (before ingress provisioning, so a stable
    /// identity exists even if provisioning fails)
    pub async fn create(&self, pov: &Pov) -> Result<Pov> {
        let row = sqlx::query(&format!(
            "INSERT INTO povs (id, room_id, user_id, label, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {POV_COLUMNS}"
        ))
        .bind(pov.id.as_str())
        .bind(pov.room_id.as_str())
        .bind(pov.user_id.as_ref().map(|u| u.as_str()))
        .bind(&pov.label)
        .bind(pov.created_at)
        .fetch_one(&self.pool)
        .await?;

        row_to_pov(&row)
    }

    /// Get POV by ID
    pub async fn get_by_id(&self, pov_id: &PovId) -> Result<Option<Pov>> {
        let row = sqlx::query(&format!("SELECT {POV_COLUMNS} FROM povs WHERE id = $1"))
            .bind(pov_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_pov(&r)).transpose()
    }

    /// List POVs belonging to a room, oldest first
    pub async fn list_by_room(&self, room_id: &RoomId) -> Result<Vec<Pov>> {
        let rows = sqlx::query(&format!(
            "SELECT {POV_COLUMNS} FROM povs WHERE room_id = $1 ORDER BY created_at ASC"
        ))
        .bind(room_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_pov).collect()
    }

    /// Find POVs owned by a user that already carry an ingress, used to
    /// reset stale upstream resources before provisioning a new one.
    pub async fn list_with_ingress_by_user(&self, user_id: &UserId) -> Result<Vec<Pov>> {
        let rows = sqlx::query(&format!(
            "SELECT {POV_COLUMNS} FROM povs WHERE user_id = $1 AND ingress_id IS NOT NULL"
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_pov).collect()
    }

    /// Persist the ingress endpoint returned by the provider
    pub async fn set_ingress(
        &self,
        pov_id: &PovId,
        ingress_id: &str,
        server_url: &str,
        stream_key: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE povs SET ingress_id = $2, server_url = $3, stream_key = $4 WHERE id = $1",
        )
        .bind(pov_id.as_str())
        .bind(ingress_id)
        .bind(server_url)
        .bind(stream_key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Clear a previously stored ingress (explicit reset)
    pub async fn clear_ingress(&self, pov_id: &PovId) -> Result<()> {
        sqlx::query(
            "UPDATE povs SET ingress_id = NULL, server_url = NULL, stream_key = NULL WHERE id = $1",
        )
        .bind(pov_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record the WHIP session resource handle returned by the upstream
    pub async fn set_whip_resource(&self, pov_id: &PovId, resource_url: &str) -> Result<()> {
        sqlx::query("UPDATE povs SET whip_resource_url = $2 WHERE id = $1")
            .bind(pov_id.as_str())
            .bind(resource_url)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Clear the WHIP session resource handle after teardown
    pub async fn clear_whip_resource(&self, pov_id: &PovId) -> Result<()> {
        sqlx::query("UPDATE povs SET whip_resource_url = NULL WHERE id = $1")
            .bind(pov_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Convert database row to Pov model
fn row_to_pov(row: &PgRow) -> Result<Pov> {
    let user_id: Option<String> = row.try_get("user_id")?;

    Ok(Pov {
        id: PovId::from_string(row.try_get("id")?),
        room_id: RoomId::from_string(row.try_get("room_id")?),
        user_id: user_id.map(UserId::from_string),
        label: row.try_get("label")?,
        ingress_id: row.try_get("ingress_id")?,
        server_url: row.try_get("server_url")?,
        stream_key: row.try_get("stream_key")?,
        whip_resource_url: row.try_get("whip_resource_url")?,
        created_at: row.try_get("created_at")?,
    })
}
