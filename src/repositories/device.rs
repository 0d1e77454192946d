use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::device::DeviceBinding,
    repositories::store::DeviceBindingStore,
};

/// Postgres-backed device binding store.
///
/// Promotion runs in one transaction holding an advisory lock keyed by the
/// bearer; the partial unique index `device_bindings_one_active` backs the
/// one-active-device invariant at the schema level.
#[derive(Clone)]
pub struct PgDeviceRepository {
    pool: Pool,
}

impl PgDeviceRepository {
    /// Creates a new `PgDeviceRepository`.
    ///
    /// # Arguments
    ///
    /// * `pool` - The database connection pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn row_to_binding(row: &Row) -> Result<DeviceBinding> {
    Ok(DeviceBinding {
        bearer_id: row.try_get("bearer_id").map_err(|_| AppError::MissingData("bearer_id".to_string()))?,
        device_fingerprint: row.try_get("device_fingerprint").map_err(|_| AppError::MissingData("device_fingerprint".to_string()))?,
        device_name: row.try_get("device_name").map_err(|_| AppError::MissingData("device_name".to_string()))?,
        active: row.try_get("active").map_err(|_| AppError::MissingData("active".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        last_used_at: row.try_get("last_used_at").map_err(|_| AppError::MissingData("last_used_at".to_string()))?,
    })
}

#[async_trait]
impl DeviceBindingStore for PgDeviceRepository {
    async fn get(&self, bearer_id: Uuid, fingerprint: &str) -> Result<Option<DeviceBinding>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT bearer_id, device_fingerprint, device_name, active, created_at, last_used_at
                FROM device_bindings
                WHERE bearer_id = $1 AND device_fingerprint = $2
                "#,
                &[&bearer_id, &fingerprint],
            )
            .await?;
        row.map(|r| row_to_binding(&r)).transpose()
    }

    async fn promote_exclusive(
        &self,
        bearer_id: Uuid,
        fingerprint: &str,
        device_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DeviceBinding> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let lock_key = bearer_id.to_string();
        tx.execute(
            "SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))",
            &[&lock_key],
        )
        .await?;

        tx.execute(
            r#"
            UPDATE device_bindings
            SET active = false
            WHERE bearer_id = $1 AND device_fingerprint <> $2 AND active
            "#,
            &[&bearer_id, &fingerprint],
        )
        .await?;

        let row = tx
            .query_one(
                r#"
                INSERT INTO device_bindings
                    (bearer_id, device_fingerprint, device_name, active, created_at, last_used_at)
                VALUES ($1, $2, $3, true, $4, $4)
                ON CONFLICT (bearer_id, device_fingerprint) DO UPDATE
                SET active = true,
                    last_used_at = EXCLUDED.last_used_at,
                    device_name = COALESCE(EXCLUDED.device_name, device_bindings.device_name)
                RETURNING bearer_id, device_fingerprint, device_name, active, created_at, last_used_at
                "#,
                &[&bearer_id, &fingerprint, &device_name, &now],
            )
            .await?;

        tx.commit().await?;
        row_to_binding(&row)
    }

    async fn list_for_bearer(&self, bearer_id: Uuid) -> Result<Vec<DeviceBinding>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT bearer_id, device_fingerprint, device_name, active, created_at, last_used_at
                FROM device_bindings
                WHERE bearer_id = $1
                ORDER BY last_used_at DESC
                "#,
                &[&bearer_id],
            )
            .await?;
        rows.iter().map(row_to_binding).collect()
    }

    async fn remove_bearer(&self, bearer_id: Uuid) -> Result<u64> {
        let client = self.pool.get().await?;
        let removed = client
            .execute("DELETE FROM device_bindings WHERE bearer_id = $1", &[&bearer_id])
            .await?;
        Ok(removed)
    }
}
