use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::clock::ClockWindow;
use crate::config::ProtocolSettings;
use crate::crypto::secret::SessionSecret;
use crate::error::{AppError, RejectReason, Result};
use crate::models::session::Session;
use crate::repositories::store::SessionStore;
use crate::services::signer::CredentialSigner;

/// A credential ready for the display surface.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    /// The wire form to render as a scannable code.
    pub credential: String,
    /// The window the credential was signed for.
    pub window_index: i64,
    /// Milliseconds until the next window; the display should re-fetch then.
    pub refresh_in_ms: i64,
}

/// Runs the session lifecycle and hands out the current credential.
#[derive(Clone)]
pub struct SessionIssuer {
    sessions: Arc<dyn SessionStore>,
    signer: CredentialSigner,
    clock: ClockWindow,
}

impl SessionIssuer {
    /// Creates a new `SessionIssuer`.
    pub fn new(sessions: Arc<dyn SessionStore>, settings: ProtocolSettings) -> Self {
        let clock = ClockWindow::new(settings.cadence_ms);
        Self {
            sessions,
            signer: CredentialSigner::new(clock),
            clock,
        }
    }

    /// Opens a session with a freshly generated secret.
    pub async fn open_session(
        &self,
        issuer_id: Uuid,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        if valid_to <= valid_from {
            return Err(AppError::Validation(
                "Session must end after it starts".to_string(),
            ));
        }
        if valid_to <= now {
            return Err(AppError::Validation(
                "Session end must be in the future".to_string(),
            ));
        }

        let session = Session {
            id: Uuid::new_v4(),
            issuer_id,
            secret: SessionSecret::generate(),
            valid_from,
            valid_to,
            active: true,
            created_at: now,
        };

        self.sessions.insert(&session).await?;
        tracing::info!("🎓 Session {} opened by {} until {}", session.id, issuer_id, valid_to);
        Ok(session)
    }

    /// Ends a session. Only the issuer who opened it may close it.
    pub async fn close_session(&self, issuer_id: Uuid, session_id: Uuid) -> Result<()> {
        self.owned_session(issuer_id, session_id).await?;
        if !self.sessions.set_active(session_id, false).await? {
            return Err(AppError::NotFound);
        }
        tracing::info!("🔒 Session {} closed by {}", session_id, issuer_id);
        Ok(())
    }

    /// Returns the session if `issuer_id` opened it.
    pub async fn owned_session(&self, issuer_id: Uuid, session_id: Uuid) -> Result<Session> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if session.issuer_id != issuer_id {
            tracing::warn!("❌ {} is not the issuer of session {}", issuer_id, session_id);
            return Err(AppError::Unauthorized);
        }
        Ok(session)
    }

    /// Issues the credential string for the current window.
    ///
    /// The caller re-invokes this every cadence period.
    pub async fn issue_credential(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<String> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(RejectReason::UnknownSession)?;

        Ok(self.signer.issue(&session, now)?.to_string())
    }

    /// Issues the current credential for the display of the owning issuer.
    pub async fn issue_for_display(
        &self,
        issuer_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<IssuedCredential> {
        let session = self.owned_session(issuer_id, session_id).await?;
        let credential = self.signer.issue(&session, now)?;

        Ok(IssuedCredential {
            window_index: credential.window_index,
            credential: credential.to_string(),
            refresh_in_ms: self.clock.remaining_ms(now),
        })
    }

    /// Marks sessions past their end inactive.
    pub async fn expire_elapsed(&self, now: DateTime<Utc>) -> Result<u64> {
        let expired = self.sessions.expire_elapsed(now).await?;
        if expired > 0 {
            tracing::info!("⏰ Expired {} elapsed sessions", expired);
        }
        Ok(expired)
    }
}
