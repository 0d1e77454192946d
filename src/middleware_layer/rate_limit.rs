use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};

use crate::{
    error::AppError,
    models::identity::Identity,
    state::AppState,
};

/// Scans allowed per bearer per window.
const SCAN_LIMIT: i64 = 10;
/// The scan limit window in seconds.
const SCAN_WINDOW_SECS: i64 = 60;
/// Device registrations allowed per bearer per window.
const DEVICE_LIMIT: i64 = 3;
/// The device registration window in seconds.
const DEVICE_WINDOW_SECS: i64 = 86_400;

/// Increments the counter at `key`, starting its window on the first hit.
/// Returns the count after the increment and the seconds left in the window.
async fn hit(state: &AppState, key: &str, window_secs: i64) -> redis::RedisResult<(i64, i64)> {
    let mut redis = state.redis.clone();

    let count: i64 = redis::cmd("INCR")
        .arg(key)
        .query_async(&mut redis)
        .await?;

    if count == 1 {
        let _: () = redis::cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .query_async(&mut redis)
            .await?;
    }

    let ttl: i64 = redis::cmd("TTL")
        .arg(key)
        .query_async(&mut redis)
        .await?;

    Ok((count, ttl.max(0)))
}

async fn limit(
    state: &AppState,
    key: String,
    max: i64,
    window_secs: i64,
    what: &str,
    req: Request<Body>,
    next: Next,
) -> Response {
    match hit(state, &key, window_secs).await {
        Ok((count, ttl)) if count > max => AppError::RateLimitExceeded(format!(
            "{} limit exceeded. Try again in {} seconds",
            what, ttl
        ))
        .into_response(),
        Ok(_) => next.run(req).await,
        Err(e) => AppError::Redis(e).into_response(),
    }
}

/// A middleware that rate limits scan submissions per bearer.
pub async fn rate_limit_scan(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = format!("rate_limit:scan:{}", identity.user_id);
    limit(&state, key, SCAN_LIMIT, SCAN_WINDOW_SECS, "Scan", req, next).await
}

/// A middleware that rate limits device registrations per bearer.
pub async fn rate_limit_device_registration(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = format!("rate_limit:device:{}", identity.user_id);
    limit(&state, key, DEVICE_LIMIT, DEVICE_WINDOW_SECS, "Device registration", req, next).await
}
