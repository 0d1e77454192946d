use chrono::{DateTime, Utc};

use crate::clock::ClockWindow;
use crate::crypto::credential::{self, Credential};
use crate::error::RejectReason;
use crate::models::session::Session;

/// Signs the credential for the window containing `now`.
#[derive(Debug, Clone, Copy)]
pub struct CredentialSigner {
    clock: ClockWindow,
}

impl CredentialSigner {
    /// Creates a new `CredentialSigner`.
    pub fn new(clock: ClockWindow) -> Self {
        Self { clock }
    }

    /// Issues a credential for the session.
    ///
    /// Every call draws a new nonce, so two credentials issued within the
    /// same window differ.
    ///
    /// # Errors
    ///
    /// `SessionInactive` when the session is closed or `now` lies outside
    /// its validity interval.
    pub fn issue(&self, session: &Session, now: DateTime<Utc>) -> Result<Credential, RejectReason> {
        if !session.is_open_at(now) {
            return Err(RejectReason::SessionInactive);
        }

        let window_index = self.clock.index_at(now);
        Ok(Credential::sign(
            &session.secret,
            session.id,
            window_index,
            credential::generate_nonce(),
        ))
    }
}
