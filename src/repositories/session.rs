use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{
    crypto::secret,
    error::{AppError, Result},
    models::session::Session,
    repositories::store::SessionStore,
};

/// Postgres-backed session store. Secrets are sealed under the master key at rest.
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: Pool,
    master_key: Zeroizing<[u8; 32]>,
}

impl PgSessionRepository {
    /// Creates a new `PgSessionRepository`.
    ///
    /// # Arguments
    ///
    /// * `pool` - The database connection pool.
    /// * `master_key` - The key sealing session secrets at rest.
    pub fn new(pool: Pool, master_key: [u8; 32]) -> Self {
        Self {
            pool,
            master_key: Zeroizing::new(master_key),
        }
    }

    fn row_to_session(&self, row: &Row) -> Result<Session> {
        let sealed: Vec<u8> = row
            .try_get("sealed_secret")
            .map_err(|_| AppError::MissingData("sealed_secret".to_string()))?;

        Ok(Session {
            id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
            issuer_id: row.try_get("issuer_id").map_err(|_| AppError::MissingData("issuer_id".to_string()))?,
            secret: secret::open(&self.master_key, &sealed)?,
            valid_from: row.try_get("valid_from").map_err(|_| AppError::MissingData("valid_from".to_string()))?,
            valid_to: row.try_get("valid_to").map_err(|_| AppError::MissingData("valid_to".to_string()))?,
            active: row.try_get("active").map_err(|_| AppError::MissingData("active".to_string()))?,
            created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        })
    }
}

#[async_trait]
impl SessionStore for PgSessionRepository {
    async fn get(&self, session_id: Uuid) -> Result<Option<Session>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, issuer_id, sealed_secret, valid_from, valid_to, active, created_at
                FROM sessions
                WHERE id = $1
                "#,
                &[&session_id],
            )
            .await?;
        row.map(|r| self.row_to_session(&r)).transpose()
    }

    async fn insert(&self, session: &Session) -> Result<()> {
        let sealed = secret::seal(&self.master_key, &session.secret)?;
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO sessions (id, issuer_id, sealed_secret, valid_from, valid_to, active, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
                &[
                    &session.id,
                    &session.issuer_id,
                    &sealed,
                    &session.valid_from,
                    &session.valid_to,
                    &session.active,
                    &session.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn set_active(&self, session_id: Uuid, active: bool) -> Result<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE sessions SET active = $2 WHERE id = $1",
                &[&session_id, &active],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn expire_elapsed(&self, now: DateTime<Utc>) -> Result<u64> {
        let client = self.pool.get().await?;
        let expired = client
            .execute(
                "UPDATE sessions SET active = false WHERE active AND valid_to < $1",
                &[&now],
            )
            .await?;
        Ok(expired)
    }
}
