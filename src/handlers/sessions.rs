use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{attendance::AttendanceRecord, identity::Identity, session::Session},
    state::AppState,
};

/// The request payload for opening a session.
///
/// Either `valid_to` or `duration_minutes` must be given; `valid_from`
/// defaults to now.
#[derive(Deserialize, Debug, Validate)]
pub struct OpenSessionRequest {
    #[garde(skip)]
    pub valid_from: Option<DateTime<Utc>>,
    #[garde(skip)]
    pub valid_to: Option<DateTime<Utc>>,
    #[garde(range(min = 1, max = 1440))]
    pub duration_minutes: Option<i64>,
}

/// The response payload listing a session's attendance.
#[derive(Serialize)]
pub struct AttendanceResponse {
    pub session_id: Uuid,
    pub count: i64,
    pub records: Vec<AttendanceRecord>,
}

fn require_issuer(identity: &Identity) -> Result<()> {
    if identity.can_issue() {
        Ok(())
    } else {
        tracing::warn!("❌ {} may not run sessions", identity.user_id);
        Err(AppError::Unauthorized)
    }
}

impl OpenSessionRequest {
    /// Resolves the requested validity interval.
    ///
    /// # Arguments
    ///
    /// * `now` - The server time, used when `valid_from` is absent.
    ///
    /// # Returns
    ///
    /// `(valid_from, valid_to)`, or `AppError::Validation` when neither end is
    /// given or the end is not representable.
    pub fn validity(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let valid_from = self.valid_from.unwrap_or(now);
        let valid_to = match (self.valid_to, self.duration_minutes) {
            (Some(valid_to), _) => valid_to,
            (None, Some(minutes)) => Duration::try_minutes(minutes)
                .and_then(|duration| valid_from.checked_add_signed(duration))
                .ok_or_else(|| AppError::Validation("Session end is out of range".to_string()))?,
            (None, None) => {
                return Err(AppError::Validation(
                    "Either valid_to or duration_minutes is required".to_string(),
                ));
            }
        };
        Ok((valid_from, valid_to))
    }
}

/// Opens a session owned by the caller.
pub async fn open_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<OpenSessionRequest>,
) -> Result<Response> {
    require_issuer(&identity)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let now = Utc::now();
    let (valid_from, valid_to) = payload.validity(now)?;

    let session: Session = state
        .protocol
        .issuer
        .open_session(identity.user_id, valid_from, valid_to, now)
        .await?;

    Ok((StatusCode::CREATED, Json(session)).into_response())
}

/// Ends a session.
pub async fn close_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    require_issuer(&identity)?;
    state
        .protocol
        .issuer
        .close_session(identity.user_id, session_id)
        .await?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Returns the credential for the current window, for rendering.
pub async fn current_credential(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    require_issuer(&identity)?;
    let issued = state
        .protocol
        .issuer
        .issue_for_display(identity.user_id, session_id, Utc::now())
        .await?;

    Ok((
        StatusCode::OK,
        [(http::header::CACHE_CONTROL, "no-store")],
        Json(issued),
    )
        .into_response())
}

/// Lists who is marked present in a session.
pub async fn session_attendance(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    require_issuer(&identity)?;
    state
        .protocol
        .issuer
        .owned_session(identity.user_id, session_id)
        .await?;

    let ledger = state.protocol.scanner.ledger();
    let records = ledger.list_for_session(session_id).await?;
    let count = ledger.count_for_session(session_id).await?;

    let response = AttendanceResponse {
        session_id,
        count,
        records,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        valid_from: Option<DateTime<Utc>>,
        valid_to: Option<DateTime<Utc>>,
        duration_minutes: Option<i64>,
    ) -> OpenSessionRequest {
        OpenSessionRequest {
            valid_from,
            valid_to,
            duration_minutes,
        }
    }

    #[test]
    fn test_duration_counts_from_now_by_default() {
        let now = Utc::now();
        let (from, to) = request(None, None, Some(90)).validity(now).unwrap();
        assert_eq!(from, now);
        assert_eq!(to, now + Duration::minutes(90));
    }

    #[test]
    fn test_explicit_end_wins_over_duration() {
        let now = Utc::now();
        let end = now + Duration::hours(2);
        let (_, to) = request(None, Some(end), Some(5)).validity(now).unwrap();
        assert_eq!(to, end);
    }

    #[test]
    fn test_missing_end_is_rejected() {
        let result = request(None, None, None).validity(Utc::now());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_end_past_the_calendar_is_rejected() {
        let result = request(Some(DateTime::<Utc>::MAX_UTC), None, Some(1)).validity(Utc::now());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
