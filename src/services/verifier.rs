use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::ClockWindow;
use crate::config::ProtocolSettings;
use crate::crypto::credential::Credential;
use crate::error::{RejectReason, Result};
use crate::repositories::store::SessionStore;
use crate::validation::scan::normalize_scanned_text;

/// Checks scanned credentials. Never writes to any store.
#[derive(Clone)]
pub struct CredentialVerifier {
    sessions: Arc<dyn SessionStore>,
    clock: ClockWindow,
    tolerance_windows: i64,
}

impl CredentialVerifier {
    /// Creates a new `CredentialVerifier`.
    ///
    /// # Arguments
    ///
    /// * `sessions` - The store the session secrets are resolved from.
    /// * `settings` - The cadence and tolerance, shared with the issuer.
    pub fn new(sessions: Arc<dyn SessionStore>, settings: ProtocolSettings) -> Self {
        Self {
            sessions,
            clock: ClockWindow::new(settings.cadence_ms),
            tolerance_windows: settings.tolerance_windows.max(1),
        }
    }

    /// Verifies scanner output against the verifier's own clock.
    ///
    /// Checks run in order: structure, session lookup, signature, freshness,
    /// session state. The first failure is returned.
    ///
    /// # Errors
    ///
    /// `AppError::Rejected` with the specific reason, or a storage error
    /// when the session lookup fails.
    pub async fn verify(&self, raw: &str, now: DateTime<Utc>) -> Result<Uuid> {
        let normalized = normalize_scanned_text(raw);
        let credential = Credential::parse(&normalized)?;

        let session = self
            .sessions
            .get(credential.session_id)
            .await?
            .ok_or(RejectReason::UnknownSession)?;

        if !credential.signature_matches(&session.secret) {
            return Err(RejectReason::InvalidSignature.into());
        }

        let current_window = self.clock.index_at(now);
        let drift = current_window.saturating_sub(credential.window_index).saturating_abs();
        if drift > self.tolerance_windows {
            tracing::debug!(
                "⌛ Credential for session {} is {} windows away (tolerance {})",
                session.id,
                drift,
                self.tolerance_windows
            );
            return Err(RejectReason::Expired.into());
        }

        if !session.is_open_at(now) {
            return Err(RejectReason::SessionClosed.into());
        }

        Ok(session.id)
    }
}
