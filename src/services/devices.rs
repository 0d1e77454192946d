use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{RejectReason, Result};
use crate::models::device::{fingerprint_tag, DeviceBinding};
use crate::repositories::store::DeviceBindingStore;

/// Keeps each bearer on exactly one active device.
#[derive(Clone)]
pub struct DeviceExclusivityManager {
    store: Arc<dyn DeviceBindingStore>,
}

impl DeviceExclusivityManager {
    /// Creates a new `DeviceExclusivityManager`.
    pub fn new(store: Arc<dyn DeviceBindingStore>) -> Self {
        Self { store }
    }

    /// Makes `fingerprint` the bearer's only active device.
    pub async fn promote(
        &self,
        bearer_id: Uuid,
        fingerprint: &str,
        device_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DeviceBinding> {
        let binding = self
            .store
            .promote_exclusive(bearer_id, fingerprint, device_name, now)
            .await?;

        tracing::info!(
            "📱 Device {} promoted for bearer {}",
            fingerprint_tag(fingerprint),
            bearer_id
        );
        Ok(binding)
    }

    /// Whether the exact (bearer, fingerprint) binding exists and is active.
    pub async fn is_active_device(&self, bearer_id: Uuid, fingerprint: &str) -> Result<bool> {
        Ok(self
            .store
            .get(bearer_id, fingerprint)
            .await?
            .is_some_and(|binding| binding.active))
    }

    /// Fails with `ForeignOrUnregisteredDevice` unless the device is the
    /// bearer's active one. Never promotes.
    pub async fn verify_ownership(&self, bearer_id: Uuid, fingerprint: &str) -> Result<()> {
        if self.is_active_device(bearer_id, fingerprint).await? {
            Ok(())
        } else {
            tracing::warn!(
                "🚫 Device {} is not active for bearer {}",
                fingerprint_tag(fingerprint),
                bearer_id
            );
            Err(RejectReason::ForeignOrUnregisteredDevice.into())
        }
    }

    /// Lists the bearer's devices.
    pub async fn list_devices(&self, bearer_id: Uuid) -> Result<Vec<DeviceBinding>> {
        self.store.list_for_bearer(bearer_id).await
    }

    /// Drops every binding of a removed account.
    pub async fn remove_bearer(&self, bearer_id: Uuid) -> Result<u64> {
        let removed = self.store.remove_bearer(bearer_id).await?;
        tracing::info!("🧹 Removed {} device bindings for bearer {}", removed, bearer_id);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::repositories::memory::MemoryStore;

    fn manager() -> DeviceExclusivityManager {
        DeviceExclusivityManager::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_promote_demotes_previous_device() {
        let devices = manager();
        let bearer = Uuid::new_v4();
        let now = Utc::now();

        devices.promote(bearer, "fingerprint-d1", None, now).await.unwrap();
        devices.promote(bearer, "fingerprint-d2", Some("phone"), now).await.unwrap();

        assert!(!devices.is_active_device(bearer, "fingerprint-d1").await.unwrap());
        assert!(devices.is_active_device(bearer, "fingerprint-d2").await.unwrap());

        let listed = devices.list_devices(bearer).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed.iter().filter(|b| b.active).count(), 1);
    }

    #[tokio::test]
    async fn test_repromote_reactivates_same_row() {
        let devices = manager();
        let bearer = Uuid::new_v4();
        let now = Utc::now();

        devices.promote(bearer, "fingerprint-d1", Some("laptop"), now).await.unwrap();
        devices.promote(bearer, "fingerprint-d2", None, now).await.unwrap();
        let back = devices
            .promote(bearer, "fingerprint-d1", None, now + chrono::Duration::seconds(5))
            .await
            .unwrap();

        assert!(back.active);
        assert_eq!(back.device_name.as_deref(), Some("laptop"));
        assert_eq!(devices.list_devices(bearer).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_verify_ownership_rejects_unknown_device() {
        let devices = manager();
        let err = devices
            .verify_ownership(Uuid::new_v4(), "fingerprint-zz")
            .await
            .unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::ForeignOrUnregisteredDevice));
    }

    #[tokio::test]
    async fn test_bearers_are_independent() {
        let devices = manager();
        let (b1, b2) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        devices.promote(b1, "shared-fingerprint", None, now).await.unwrap();
        devices.promote(b2, "shared-fingerprint", None, now).await.unwrap();

        assert!(devices.is_active_device(b1, "shared-fingerprint").await.unwrap());
        assert!(devices.is_active_device(b2, "shared-fingerprint").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_bearer() {
        let devices = manager();
        let bearer = Uuid::new_v4();
        devices.promote(bearer, "fingerprint-d1", None, Utc::now()).await.unwrap();
        assert_eq!(devices.remove_bearer(bearer).await.unwrap(), 1);
        assert!(devices.list_devices(bearer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_a_rejection() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let devices = DeviceExclusivityManager::new(Arc::new(store));
        let err = devices
            .verify_ownership(Uuid::new_v4(), "fingerprint-d1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StorageUnavailable(_)));
    }
}
