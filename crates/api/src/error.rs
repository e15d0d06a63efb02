//! Error taxonomy for the API
//!
//! Every failure maps onto a finite code set and a uniform envelope:
//! `{"error": {"code", "message", "details"}}`. Internal faults are logged
//! server-side and surface with an opaque message.

use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

use moltrelay_core::models::JobStatus;
use moltrelay_core::CoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("Missing, ill-formed, or unverifiable request signature")]
    InvalidSignature,

    #[error("Request timestamp outside the accepted window")]
    TimestampSkew,

    #[error("Nonce already used within the replay window")]
    NonceReplay,

    #[error("Caller is not the {role} for this resource")]
    Forbidden { role: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{reason}")]
    InvalidState {
        reason: String,
        status: Option<JobStatus>,
    },

    #[error("Idempotency key reused with a different request")]
    IdempotencyConflict,

    #[error("Idempotency key is still being processed")]
    IdempotencyInProgress,

    #[error("{field} exceeds the size cap of {limit_bytes} bytes")]
    PayloadTooLarge {
        field: &'static str,
        limit_bytes: usize,
    },

    #[error("Rate limit exceeded")]
    RateLimited {
        scope: &'static str,
        limit: u32,
        window_secs: u64,
        retry_after_secs: u64,
    },

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Wire code for the envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::InvalidSignature => "auth.invalid_signature",
            Self::TimestampSkew => "auth.timestamp_skew",
            Self::NonceReplay => "auth.nonce_replay",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::IdempotencyConflict => "idempotency_conflict",
            Self::IdempotencyInProgress => "idempotency_in_progress",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::RateLimited { .. } => "rate_limited",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidSignature | Self::TimestampSkew | Self::NonceReplay => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState { .. }
            | Self::IdempotencyConflict
            | Self::IdempotencyInProgress => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Value {
        match self {
            Self::Validation {
                details: Some(details),
                ..
            } => details.clone(),
            Self::InvalidState {
                status: Some(status),
                ..
            } => json!({ "status": status }),
            Self::PayloadTooLarge { field, limit_bytes } => {
                json!({ "field": field, "limit_bytes": limit_bytes })
            }
            Self::RateLimited {
                scope,
                limit,
                window_secs,
                ..
            } => json!({ "scope": scope, "limit": limit, "window_secs": window_secs }),
            _ => Value::Null,
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(what) => Self::NotFound(what.to_string()),
            CoreError::Forbidden { role } => Self::Forbidden {
                role: role.to_string(),
            },
            CoreError::InvalidState { status, reason } => Self::InvalidState { reason, status },
            other => Self::Internal(other.into()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            tracing::error!(error = ?err, "Unhandled fault");
        }

        // Opaque message for internal faults; everything else is
        // deterministic and safe to echo.
        let message = match &self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = json!({
            "error": {
                "code": self.code(),
                "message": message,
                "details": self.details(),
            }
        });

        let mut response = (self.status_code(), Json(body)).into_response();
        if let Self::RateLimited {
            retry_after_secs, ..
        } = &self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_and_status_mapping() {
        let cases: Vec<(ApiError, &str, StatusCode)> = vec![
            (
                ApiError::validation("bad"),
                "validation_error",
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::InvalidSignature,
                "auth.invalid_signature",
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::TimestampSkew,
                "auth.timestamp_skew",
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::NonceReplay,
                "auth.nonce_replay",
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::Forbidden {
                    role: "buyer".into(),
                },
                "forbidden",
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::NotFound("job".into()),
                "not_found",
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::InvalidState {
                    reason: "x".into(),
                    status: None,
                },
                "invalid_state",
                StatusCode::CONFLICT,
            ),
            (
                ApiError::IdempotencyConflict,
                "idempotency_conflict",
                StatusCode::CONFLICT,
            ),
            (
                ApiError::IdempotencyInProgress,
                "idempotency_in_progress",
                StatusCode::CONFLICT,
            ),
            (
                ApiError::PayloadTooLarge {
                    field: "request_payload",
                    limit_bytes: 65536,
                },
                "payload_too_large",
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                ApiError::RateLimited {
                    scope: "ip",
                    limit: 120,
                    window_secs: 60,
                    retry_after_secs: 1,
                },
                "rate_limited",
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ApiError::Internal(anyhow::anyhow!("boom")),
                "internal_error",
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn test_core_error_mapping() {
        let err: ApiError = CoreError::NotFound("job").into();
        assert_eq!(err.code(), "not_found");

        let err: ApiError = CoreError::Forbidden { role: "seller" }.into();
        assert_eq!(err.code(), "forbidden");

        let err: ApiError = CoreError::invalid_state(JobStatus::Expired, "quote has expired").into();
        assert_eq!(err.code(), "invalid_state");
        assert_eq!(err.details()["status"], "expired");

        let err: ApiError = CoreError::DatabaseConnection("down".into()).into();
        assert_eq!(err.code(), "internal_error");
    }

    #[test]
    fn test_internal_error_message_is_opaque() {
        let err = ApiError::Internal(anyhow::anyhow!("connection string leaked"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let err = ApiError::RateLimited {
            scope: "pubkey",
            limit: 60,
            window_secs: 60,
            retry_after_secs: 7,
        };
        let response = err.into_response();
        assert_eq!(response.headers().get("Retry-After").unwrap(), "7");
    }
}
