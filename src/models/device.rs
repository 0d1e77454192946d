use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A bearer's device, identified by a client-computed fingerprint.
///
/// At most one binding per bearer is active at any instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBinding {
    pub bearer_id: Uuid,
    pub device_fingerprint: String,
    pub device_name: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl DeviceBinding {
    /// Returns the listing form, with the fingerprint replaced by its tag.
    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            fingerprint_tag: fingerprint_tag(&self.device_fingerprint),
            device_name: self.device_name.clone(),
            active: self.active,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        }
    }
}

/// What a bearer sees when listing their own devices.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub fingerprint_tag: String,
    pub device_name: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// A short, non-reversible tag for a fingerprint, safe to log.
pub fn fingerprint_tag(fingerprint: &str) -> String {
    blake3::hash(fingerprint.as_bytes()).to_hex()[..12].to_string()
}
