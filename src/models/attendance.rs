use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One bearer's presence in one session. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    /// The unique identifier for the record.
    pub id: Uuid,
    /// The session attended.
    pub session_id: Uuid,
    /// The bearer who attended.
    pub bearer_id: Uuid,
    /// The device the scan came from.
    #[serde(skip)]
    pub device_fingerprint: String,
    /// When the scan was accepted.
    pub scanned_at: DateTime<Utc>,
}

/// The result of an insert-if-absent against the ledger store.
#[derive(Debug, Clone)]
pub struct InsertOutcome {
    /// Whether this call created the row.
    pub inserted: bool,
    /// The stored row, new or pre-existing.
    pub record: AttendanceRecord,
}
