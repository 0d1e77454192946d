//! Store contracts consumed by the credential protocol.
//!
//! Each method is one logical call to the backing store and the only place a
//! protocol operation may suspend. Methods documented as atomic must be
//! atomic in the implementation, not composed from separate reads and writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::attendance::{AttendanceRecord, InsertOutcome};
use crate::models::device::DeviceBinding;
use crate::models::session::Session;

/// Sessions and their signing secrets.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Looks up a session, secret included.
    async fn get(&self, session_id: Uuid) -> Result<Option<Session>>;

    /// Persists a newly opened session.
    async fn insert(&self, session: &Session) -> Result<()>;

    /// Flips the active flag. Returns `false` when the session does not exist.
    async fn set_active(&self, session_id: Uuid, active: bool) -> Result<bool>;

    /// Marks every active session whose `valid_to` is before `now` inactive.
    async fn expire_elapsed(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Bearer to device bindings.
#[async_trait]
pub trait DeviceBindingStore: Send + Sync {
    /// Looks up the binding for an exact (bearer, fingerprint) pair.
    async fn get(&self, bearer_id: Uuid, fingerprint: &str) -> Result<Option<DeviceBinding>>;

    /// Atomically deactivates every other binding of the bearer and upserts
    /// this one as active with `last_used_at = now`.
    ///
    /// Concurrent calls for the same bearer are serialized; no observer may
    /// see two active bindings.
    async fn promote_exclusive(
        &self,
        bearer_id: Uuid,
        fingerprint: &str,
        device_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DeviceBinding>;

    /// Lists all bindings of a bearer, newest first.
    async fn list_for_bearer(&self, bearer_id: Uuid) -> Result<Vec<DeviceBinding>>;

    /// Deletes all bindings of a bearer (account removal).
    async fn remove_bearer(&self, bearer_id: Uuid) -> Result<u64>;
}

/// The attendance ledger.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Inserts the record unless one exists for its (session, bearer) pair,
    /// in which case the existing row is returned with `inserted = false`.
    async fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<InsertOutcome>;

    /// Lists the records of a session in scan order.
    async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<AttendanceRecord>>;

    /// Counts the records of a session.
    async fn count_for_session(&self, session_id: Uuid) -> Result<i64>;

    /// Deletes every record of a session (administrative purge).
    async fn purge_session(&self, session_id: Uuid) -> Result<u64>;
}
