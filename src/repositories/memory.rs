//! In-process store implementations.
//!
//! Used by tests and by embedders that do not need durability. Each table sits
//! behind its own lock, and every trait method takes that lock once for its
//! whole read-modify-write, which gives the atomicity the store contracts ask for.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::attendance::{AttendanceRecord, InsertOutcome};
use crate::models::device::DeviceBinding;
use crate::models::session::Session;
use crate::repositories::store::{AttendanceStore, DeviceBindingStore, SessionStore};

/// An in-memory implementation of every store contract.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    devices: Arc<Mutex<HashMap<Uuid, Vec<DeviceBinding>>>>,
    attendance: Arc<Mutex<Vec<AttendanceRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates a new, empty `MemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StorageUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StorageUnavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, session_id: Uuid) -> Result<Option<Session>> {
        self.check_available()?;
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn insert(&self, session: &Session) -> Result<()> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(AppError::Validation("Session already exists".to_string()));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn set_active(&self, session_id: Uuid, active: bool) -> Result<bool> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(session) => {
                session.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn expire_elapsed(&self, now: DateTime<Utc>) -> Result<u64> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        let mut expired = 0;
        for session in sessions.values_mut() {
            if session.active && session.valid_to < now {
                session.active = false;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl DeviceBindingStore for MemoryStore {
    async fn get(&self, bearer_id: Uuid, fingerprint: &str) -> Result<Option<DeviceBinding>> {
        self.check_available()?;
        let devices = self.devices.lock().await;
        Ok(devices
            .get(&bearer_id)
            .and_then(|bindings| bindings.iter().find(|b| b.device_fingerprint == fingerprint))
            .cloned())
    }

    async fn promote_exclusive(
        &self,
        bearer_id: Uuid,
        fingerprint: &str,
        device_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DeviceBinding> {
        self.check_available()?;
        let mut devices = self.devices.lock().await;
        let bindings = devices.entry(bearer_id).or_default();

        for binding in bindings.iter_mut() {
            if binding.device_fingerprint != fingerprint {
                binding.active = false;
            }
        }

        let promoted = match bindings.iter_mut().find(|b| b.device_fingerprint == fingerprint) {
            Some(binding) => {
                binding.active = true;
                binding.last_used_at = now;
                if let Some(name) = device_name {
                    binding.device_name = Some(name.to_string());
                }
                binding.clone()
            }
            None => {
                let binding = DeviceBinding {
                    bearer_id,
                    device_fingerprint: fingerprint.to_string(),
                    device_name: device_name.map(str::to_string),
                    active: true,
                    created_at: now,
                    last_used_at: now,
                };
                bindings.push(binding.clone());
                binding
            }
        };

        Ok(promoted)
    }

    async fn list_for_bearer(&self, bearer_id: Uuid) -> Result<Vec<DeviceBinding>> {
        self.check_available()?;
        let devices = self.devices.lock().await;
        let mut bindings = devices.get(&bearer_id).cloned().unwrap_or_default();
        bindings.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        Ok(bindings)
    }

    async fn remove_bearer(&self, bearer_id: Uuid) -> Result<u64> {
        self.check_available()?;
        let mut devices = self.devices.lock().await;
        Ok(devices.remove(&bearer_id).map(|b| b.len() as u64).unwrap_or(0))
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<InsertOutcome> {
        self.check_available()?;
        let mut attendance = self.attendance.lock().await;

        if let Some(existing) = attendance
            .iter()
            .find(|r| r.session_id == record.session_id && r.bearer_id == record.bearer_id)
        {
            return Ok(InsertOutcome {
                inserted: false,
                record: existing.clone(),
            });
        }

        attendance.push(record.clone());
        Ok(InsertOutcome {
            inserted: true,
            record: record.clone(),
        })
    }

    async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<AttendanceRecord>> {
        self.check_available()?;
        let attendance = self.attendance.lock().await;
        let mut records: Vec<AttendanceRecord> = attendance
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.scanned_at.cmp(&b.scanned_at));
        Ok(records)
    }

    async fn count_for_session(&self, session_id: Uuid) -> Result<i64> {
        self.check_available()?;
        let attendance = self.attendance.lock().await;
        Ok(attendance.iter().filter(|r| r.session_id == session_id).count() as i64)
    }

    async fn purge_session(&self, session_id: Uuid) -> Result<u64> {
        self.check_available()?;
        let mut attendance = self.attendance.lock().await;
        let before = attendance.len();
        attendance.retain(|r| r.session_id != session_id);
        Ok((before - attendance.len()) as u64)
    }
}
