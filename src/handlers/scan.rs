use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    models::identity::Identity,
    services::scan::Outcome,
    state::AppState,
};

/// The request payload for a scan submission.
#[derive(Deserialize, Debug, Validate)]
pub struct ScanRequest {
    /// The text exactly as the camera decoded it.
    #[garde(length(min = 1, max = 2048))]
    pub raw: String,
    #[garde(length(min = 8, max = 128))]
    pub fingerprint: String,
}

/// The response payload for a scan submission.
#[derive(Serialize)]
pub struct ScanResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Exchanges a scanned credential for an attendance record.
pub async fn submit_scan(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ScanRequest>,
) -> Result<Response> {
    if !identity.can_scan() {
        return Err(AppError::Unauthorized);
    }
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    // Freshness is judged on this server's clock, never the client's.
    let outcome = state
        .protocol
        .scanner
        .submit_scan(&payload.raw, identity.user_id, &payload.fingerprint, Utc::now())
        .await?;

    let (status, message) = match &outcome {
        Outcome::Recorded { .. } => (StatusCode::CREATED, "Marked present"),
        Outcome::AlreadyRecorded { .. } => (StatusCode::OK, "Already marked present"),
        Outcome::Rejected { reason } => return Ok(AppError::Rejected(*reason).into_response()),
    };

    Ok((status, Json(ScanResponse { message, outcome })).into_response())
}
