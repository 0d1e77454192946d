use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, RejectReason, Result};
use crate::models::attendance::AttendanceRecord;
use crate::models::device::{fingerprint_tag, DeviceBinding};
use crate::services::devices::DeviceExclusivityManager;
use crate::services::ledger::{AttendanceLedger, LedgerEntry};
use crate::services::verifier::CredentialVerifier;
use crate::validation::scan::validate_fingerprint;

/// The single answer to a scan submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The bearer is now marked present.
    Recorded { record: AttendanceRecord },
    /// The bearer was already marked present; the original record is returned.
    AlreadyRecorded { record: AttendanceRecord },
    /// The scan was refused.
    Rejected { reason: RejectReason },
}

/// The bearer-facing scan flow.
#[derive(Clone)]
pub struct ScanHandler {
    devices: DeviceExclusivityManager,
    verifier: CredentialVerifier,
    ledger: AttendanceLedger,
}

impl ScanHandler {
    /// Creates a new `ScanHandler`.
    pub fn new(
        devices: DeviceExclusivityManager,
        verifier: CredentialVerifier,
        ledger: AttendanceLedger,
    ) -> Self {
        Self {
            devices,
            verifier,
            ledger,
        }
    }

    /// Device check, then credential verification, then the ledger write.
    ///
    /// # Arguments
    ///
    /// * `raw` - The text exactly as the scanner decoded it.
    /// * `bearer_id` - The authenticated bearer.
    /// * `device_fingerprint` - The fingerprint of the scanning device.
    /// * `now` - The verifier's clock.
    ///
    /// Nothing is written unless every check passed. Protocol rejections come
    /// back as `Outcome::Rejected`; only store failures are `Err`.
    pub async fn submit_scan(
        &self,
        raw: &str,
        bearer_id: Uuid,
        device_fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        match self.try_scan(raw, bearer_id, device_fingerprint, now).await {
            Ok(LedgerEntry::Recorded(record)) => Ok(Outcome::Recorded { record }),
            Ok(LedgerEntry::AlreadyRecorded(record)) => Ok(Outcome::AlreadyRecorded { record }),
            Err(AppError::Rejected(reason)) => {
                tracing::warn!(
                    "🚫 Scan rejected for bearer {} on device {}: {}",
                    bearer_id,
                    fingerprint_tag(device_fingerprint),
                    reason.code()
                );
                Ok(Outcome::Rejected { reason })
            }
            Err(e) => Err(e),
        }
    }

    async fn try_scan(
        &self,
        raw: &str,
        bearer_id: Uuid,
        device_fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        self.devices.verify_ownership(bearer_id, device_fingerprint).await?;
        let session_id = self.verifier.verify(raw, now).await?;
        self.ledger.record(session_id, bearer_id, device_fingerprint, now).await
    }

    /// Registers the calling device and makes it the bearer's only active one.
    pub async fn register_device(
        &self,
        bearer_id: Uuid,
        device_fingerprint: &str,
        device_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DeviceBinding> {
        validate_fingerprint(device_fingerprint)?;
        self.devices
            .promote(bearer_id, device_fingerprint, device_name, now)
            .await
    }

    /// The device manager behind this flow.
    pub fn devices(&self) -> &DeviceExclusivityManager {
        &self.devices
    }

    /// The verifier behind this flow.
    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    /// The ledger behind this flow.
    pub fn ledger(&self) -> &AttendanceLedger {
        &self.ledger
    }
}
