use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role an identity provider assigned to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Professor,
    Student,
}

/// An authenticated caller, as published by the external identity provider.
///
/// Stored in Redis under `identity:{token}` as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// The ID of the user this identity belongs to.
    pub user_id: Uuid,
    /// The user's role.
    pub role: Role,
    /// The timestamp when the identity expires.
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    /// Whether this identity may open and run sessions.
    pub fn can_issue(&self) -> bool {
        matches!(self.role, Role::Professor | Role::Admin)
    }

    /// Whether this identity may scan credentials.
    pub fn can_scan(&self) -> bool {
        self.role == Role::Student
    }
}
