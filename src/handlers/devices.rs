use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use garde::Validate;
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    models::{device::DeviceSummary, identity::Identity},
    state::AppState,
};

/// The request payload for registering the calling device.
#[derive(Deserialize, Debug, Validate)]
pub struct RegisterDeviceRequest {
    #[garde(length(min = 8, max = 128))]
    pub fingerprint: String,
    #[garde(length(max = 64))]
    pub device_name: Option<String>,
}

fn require_bearer(identity: &Identity) -> Result<()> {
    if identity.can_scan() {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

/// Registers the calling device as the bearer's only active device.
pub async fn register_device(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<RegisterDeviceRequest>,
) -> Result<Response> {
    require_bearer(&identity)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let binding = state
        .protocol
        .scanner
        .register_device(
            identity.user_id,
            &payload.fingerprint,
            payload.device_name.as_deref(),
            Utc::now(),
        )
        .await?;

    Ok((StatusCode::OK, Json(binding.summary())).into_response())
}

/// Lists the caller's devices.
pub async fn list_devices(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response> {
    require_bearer(&identity)?;
    let devices: Vec<DeviceSummary> = state
        .protocol
        .scanner
        .devices()
        .list_devices(identity.user_id)
        .await?
        .iter()
        .map(|binding| binding.summary())
        .collect();

    Ok((StatusCode::OK, Json(devices)).into_response())
}
