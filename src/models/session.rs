use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::secret::SessionSecret;

/// A session an issuer runs and attendees check into.
///
/// The secret is skipped on serialization; it never leaves the service.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// The unique identifier for the session.
    pub id: Uuid,
    /// The user who opened the session.
    pub issuer_id: Uuid,
    /// The signing secret for this session's credentials.
    #[serde(skip)]
    pub secret: SessionSecret,
    /// When the session starts accepting attendance.
    pub valid_from: DateTime<Utc>,
    /// When the session stops accepting attendance.
    pub valid_to: DateTime<Utc>,
    /// Whether the issuer still has the session open.
    pub active: bool,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Whether `now` lies within the validity interval, bounds included.
    pub fn is_within_validity(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_to
    }

    /// Whether the session is open and `now` is inside its validity interval.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.is_within_validity(now)
    }
}
