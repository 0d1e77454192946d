use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;

use crate::{
    models::identity::Identity,
    state::AppState,
};

use redis::AsyncCommands;

/// The cookie the identity provider sets.
const IDENTITY_COOKIE: &str = "session_id";

/// Extracts the identity token from the request cookies or the
/// `Authorization: Bearer` header, cookie first.
fn extract_identity_token(cookies: &Cookies, request: &Request<Body>) -> Option<String> {
    if let Some(cookie) = cookies.get(IDENTITY_COOKIE) {
        let value = cookie.value().trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// A middleware that requires an identity published by the identity provider.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `cookies` - The request cookies.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The response from the next middleware with the `Identity` attached as an
/// extension, `401` when the token is missing, unknown or expired, or `503`
/// when Redis cannot be reached.
pub async fn require_identity(
    State(mut state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    tracing::debug!("🔐 Checking identity...");

    let token = extract_identity_token(&cookies, &request).ok_or_else(|| {
        tracing::warn!("❌ No identity token found");
        StatusCode::UNAUTHORIZED
    })?;

    let identity_json: Option<String> = state
        .redis
        .get(format!("identity:{}", token))
        .await
        .map_err(|e| {
            tracing::error!("❌ Redis error while resolving identity: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    let identity_json = identity_json.ok_or_else(|| {
        tracing::warn!("❌ Identity token not found");
        StatusCode::UNAUTHORIZED
    })?;

    let identity: Identity = sonic_rs::from_str(&identity_json).map_err(|e| {
        tracing::warn!("❌ Invalid identity JSON: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    if chrono::Utc::now() > identity.expires_at {
        tracing::warn!("❌ Identity expired for user: {}", identity.user_id);
        return Err(StatusCode::UNAUTHORIZED);
    }

    tracing::debug!("✅ Identity resolved: {} ({:?})", identity.user_id, identity.role);

    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}
