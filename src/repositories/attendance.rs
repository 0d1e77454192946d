use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::attendance::{AttendanceRecord, InsertOutcome},
    repositories::store::AttendanceStore,
};

/// Postgres-backed attendance ledger. The unique key on
/// `(session_id, bearer_id)` makes the insert conditional.
#[derive(Clone)]
pub struct PgAttendanceRepository {
    pool: Pool,
}

impl PgAttendanceRepository {
    /// Creates a new `PgAttendanceRepository`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &Row) -> Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        session_id: row.try_get("session_id").map_err(|_| AppError::MissingData("session_id".to_string()))?,
        bearer_id: row.try_get("bearer_id").map_err(|_| AppError::MissingData("bearer_id".to_string()))?,
        device_fingerprint: row.try_get("device_fingerprint").map_err(|_| AppError::MissingData("device_fingerprint".to_string()))?,
        scanned_at: row.try_get("scanned_at").map_err(|_| AppError::MissingData("scanned_at".to_string()))?,
    })
}

#[async_trait]
impl AttendanceStore for PgAttendanceRepository {
    async fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<InsertOutcome> {
        let client = self.pool.get().await?;
        let inserted = client
            .query_opt(
                r#"
                INSERT INTO attendance (id, session_id, bearer_id, device_fingerprint, scanned_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (session_id, bearer_id) DO NOTHING
                RETURNING id, session_id, bearer_id, device_fingerprint, scanned_at
                "#,
                &[
                    &record.id,
                    &record.session_id,
                    &record.bearer_id,
                    &record.device_fingerprint,
                    &record.scanned_at,
                ],
            )
            .await?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome {
                inserted: true,
                record: row_to_record(&row)?,
            });
        }

        let existing = client
            .query_opt(
                r#"
                SELECT id, session_id, bearer_id, device_fingerprint, scanned_at
                FROM attendance
                WHERE session_id = $1 AND bearer_id = $2
                "#,
                &[&record.session_id, &record.bearer_id],
            )
            .await?
            .ok_or_else(|| AppError::Internal("Attendance conflict without a stored row".to_string()))?;

        Ok(InsertOutcome {
            inserted: false,
            record: row_to_record(&existing)?,
        })
    }

    async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<AttendanceRecord>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT id, session_id, bearer_id, device_fingerprint, scanned_at
                FROM attendance
                WHERE session_id = $1
                ORDER BY scanned_at ASC
                "#,
                &[&session_id],
            )
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn count_for_session(&self, session_id: Uuid) -> Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) AS total FROM attendance WHERE session_id = $1",
                &[&session_id],
            )
            .await?;
        row.try_get("total").map_err(|_| AppError::MissingData("total".to_string()))
    }

    async fn purge_session(&self, session_id: Uuid) -> Result<u64> {
        let client = self.pool.get().await?;
        let purged = client
            .execute("DELETE FROM attendance WHERE session_id = $1", &[&session_id])
            .await?;
        Ok(purged)
    }
}
