use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::models::attendance::AttendanceRecord;
use crate::repositories::store::AttendanceStore;

/// What a ledger write produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "record", rename_all = "snake_case")]
pub enum LedgerEntry {
    /// This call created the record.
    Recorded(AttendanceRecord),
    /// A record already existed; it is returned unchanged.
    AlreadyRecorded(AttendanceRecord),
}

impl LedgerEntry {
    /// The stored record, whichever call created it.
    pub fn record(&self) -> &AttendanceRecord {
        match self {
            LedgerEntry::Recorded(record) | LedgerEntry::AlreadyRecorded(record) => record,
        }
    }
}

/// Records attendance at most once per (session, bearer).
#[derive(Clone)]
pub struct AttendanceLedger {
    store: Arc<dyn AttendanceStore>,
}

impl AttendanceLedger {
    /// Creates a new `AttendanceLedger`.
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    /// Writes the record unless the bearer is already marked present.
    ///
    /// A duplicate is an expected outcome (double taps, client retries) and
    /// comes back as `AlreadyRecorded` with the original timestamp.
    pub async fn record(
        &self,
        session_id: Uuid,
        bearer_id: Uuid,
        device_fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        let candidate = AttendanceRecord {
            id: Uuid::new_v4(),
            session_id,
            bearer_id,
            device_fingerprint: device_fingerprint.to_string(),
            scanned_at: now,
        };

        let outcome = self.store.insert_if_absent(&candidate).await?;
        if outcome.inserted {
            tracing::info!("✅ Attendance recorded: session {} bearer {}", session_id, bearer_id);
            Ok(LedgerEntry::Recorded(outcome.record))
        } else {
            tracing::debug!("🔁 Attendance already recorded: session {} bearer {}", session_id, bearer_id);
            Ok(LedgerEntry::AlreadyRecorded(outcome.record))
        }
    }

    /// Lists a session's records in scan order.
    pub async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<AttendanceRecord>> {
        self.store.list_for_session(session_id).await
    }

    /// Counts a session's records.
    pub async fn count_for_session(&self, session_id: Uuid) -> Result<i64> {
        self.store.count_for_session(session_id).await
    }

    /// Removes every record of a session.
    pub async fn purge_session(&self, session_id: Uuid) -> Result<u64> {
        let purged = self.store.purge_session(session_id).await?;
        tracing::warn!("🧹 Purged {} attendance records from session {}", purged, session_id);
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryStore;
    use chrono::Duration;

    #[tokio::test]
    async fn test_duplicate_keeps_first_timestamp() {
        let ledger = AttendanceLedger::new(Arc::new(MemoryStore::new()));
        let (session, bearer) = (Uuid::new_v4(), Uuid::new_v4());
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(30);

        let first = ledger.record(session, bearer, "fingerprint-d1", t1).await.unwrap();
        let second = ledger.record(session, bearer, "fingerprint-d1", t2).await.unwrap();

        assert!(matches!(first, LedgerEntry::Recorded(_)));
        match second {
            LedgerEntry::AlreadyRecorded(record) => {
                assert_eq!(record.scanned_at, t1);
                assert_eq!(record.id, first.record().id);
            }
            other => panic!("expected AlreadyRecorded, got {other:?}"),
        }
        assert_eq!(ledger.count_for_session(session).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sessions_and_bearers_are_independent() {
        let ledger = AttendanceLedger::new(Arc::new(MemoryStore::new()));
        let (s1, s2, b1, b2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        for (s, b) in [(s1, b1), (s1, b2), (s2, b1)] {
            let entry = ledger.record(s, b, "fingerprint-d1", now).await.unwrap();
            assert!(matches!(entry, LedgerEntry::Recorded(_)));
        }

        assert_eq!(ledger.count_for_session(s1).await.unwrap(), 2);
        assert_eq!(ledger.list_for_session(s2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_record_once() {
        let ledger = AttendanceLedger::new(Arc::new(MemoryStore::new()));
        let (session, bearer) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        let attempts: Vec<_> = (0..16)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger
                        .record(session, bearer, "fingerprint-d1", now + Duration::milliseconds(i))
                        .await
                })
            })
            .collect();

        let mut recorded = 0;
        for attempt in attempts {
            if let LedgerEntry::Recorded(_) = attempt.await.unwrap().unwrap() {
                recorded += 1;
            }
        }

        assert_eq!(recorded, 1);
        assert_eq!(ledger.count_for_session(session).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_session() {
        let ledger = AttendanceLedger::new(Arc::new(MemoryStore::new()));
        let session = Uuid::new_v4();
        ledger.record(session, Uuid::new_v4(), "fingerprint-d1", Utc::now()).await.unwrap();
        assert_eq!(ledger.purge_session(session).await.unwrap(), 1);
        assert_eq!(ledger.count_for_session(session).await.unwrap(), 0);
    }
}
