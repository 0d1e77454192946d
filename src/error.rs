use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Why a credential or a scan was rejected.
///
/// Every variant is terminal for the attempt that produced it. None of them
/// carries secrets or another bearer's device data.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The session is not open for issuing credentials.
    #[error("session is not active")]
    SessionInactive,

    /// The session was ended or is outside its validity interval.
    #[error("session is closed")]
    SessionClosed,

    /// The scanned text does not have the credential structure.
    #[error("malformed credential payload")]
    MalformedPayload,

    /// No session secret could be resolved for the credential.
    #[error("unknown session")]
    UnknownSession,

    /// The credential signature does not match.
    #[error("invalid credential signature")]
    InvalidSignature,

    /// The credential belongs to a window outside the tolerance.
    #[error("credential expired")]
    Expired,

    /// The scanning device is not the bearer's active device.
    #[error("foreign or unregistered device")]
    ForeignOrUnregisteredDevice,
}

impl RejectReason {
    /// A stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::SessionInactive => "session_inactive",
            RejectReason::SessionClosed => "session_closed",
            RejectReason::MalformedPayload => "malformed_payload",
            RejectReason::UnknownSession => "unknown_session",
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::Expired => "expired",
            RejectReason::ForeignOrUnregisteredDevice => "foreign_or_unregistered_device",
        }
    }

    /// The message shown to the person holding the device.
    pub fn user_message(&self) -> &'static str {
        match self {
            RejectReason::SessionInactive => "This session is not accepting attendance",
            RejectReason::SessionClosed => "This session has ended",
            RejectReason::MalformedPayload => "This is not an attendance code",
            RejectReason::UnknownSession => "This attendance code is not recognised",
            RejectReason::InvalidSignature => "This attendance code is not valid",
            RejectReason::Expired => "The code has refreshed, please scan again",
            RejectReason::ForeignOrUnregisteredDevice => "Register this device first",
        }
    }

    /// The HTTP status used when the rejection reaches the transport.
    pub fn status(&self) -> StatusCode {
        match self {
            RejectReason::SessionInactive | RejectReason::SessionClosed => StatusCode::CONFLICT,
            RejectReason::MalformedPayload => StatusCode::BAD_REQUEST,
            RejectReason::UnknownSession => StatusCode::NOT_FOUND,
            RejectReason::InvalidSignature => StatusCode::UNPROCESSABLE_ENTITY,
            RejectReason::Expired => StatusCode::GONE,
            RejectReason::ForeignOrUnregisteredDevice => StatusCode::FORBIDDEN,
        }
    }
}

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A protocol-level rejection.
    #[error("Rejected: {0}")]
    Rejected(#[from] RejectReason),

    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A pool construction error.
    #[error("Pool configuration error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A store collaborator could not be reached.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A row was missing a column or held an unexpected value.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An authorization error.
    #[error("Authorization failed")]
    Unauthorized,

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Whether the failure came from an unreachable store, so the caller may retry.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Pool(_)
                | AppError::CreatePool(_)
                | AppError::Redis(_)
                | AppError::StorageUnavailable(_)
        )
    }

    /// Returns the rejection reason, if this is a protocol rejection.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            AppError::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            AppError::Rejected(reason) => {
                tracing::warn!("Rejected: {}", reason.code());
                (reason.status(), reason.user_message().to_string(), reason.code())
            }

            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable".to_string(), "storage_unavailable")
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable".to_string(), "storage_unavailable")
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Pool configuration error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable".to_string(), "storage_unavailable")
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable".to_string(), "storage_unavailable")
            }

            AppError::StorageUnavailable(ref msg) => {
                tracing::error!("Storage unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable".to_string(), "storage_unavailable")
            }

            AppError::MissingData(ref column) => {
                tracing::error!("Missing data in column: {}", column);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), "internal")
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone(), "unauthenticated")
            }

            AppError::Unauthorized => {
                tracing::warn!("Authorization failed");
                (StatusCode::FORBIDDEN, "Forbidden".to_string(), "forbidden")
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string(), "not_found")
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone(), "validation")
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Encryption error".to_string(), "internal")
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), "internal")
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, msg.clone(), "rate_limited")
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message,
            "code": code,
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error","code":"internal"}"#.to_string());

        (status, [(http::header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}
