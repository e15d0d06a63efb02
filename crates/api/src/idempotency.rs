//! Idempotency middleware
//!
//! Runs after the auth guard so records are scoped per caller pubkey. A
//! mutation carrying an `Idempotency-Key` is executed once; repeats replay
//! the recorded response bytes verbatim and are marked with
//! `Idempotency-Replayed: true`.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

use moltrelay_core::db::IdempotencyOutcome;

use crate::auth::AuthIdentity;
use crate::error::{ApiError, Result};
use crate::state::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const IDEMPOTENCY_REPLAYED_HEADER: &str = "idempotency-replayed";

pub async fn record_or_replay(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if request.method() != Method::POST {
        return Ok(next.run(request).await);
    }
    let Some(key) = request
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
    else {
        return Ok(next.run(request).await);
    };

    if key.is_empty() || key.len() > 128 {
        return Err(ApiError::validation(
            "Idempotency-Key must be between 1 and 128 characters",
        ));
    }

    let Some(identity) = request.extensions().get::<AuthIdentity>().cloned() else {
        // The auth guard runs first on every route carrying this layer.
        return Ok(next.run(request).await);
    };

    let (parts, body) = request.into_parts();
    let body_bytes = to_bytes(body, state.config.body_max_bytes)
        .await
        .map_err(|_| ApiError::PayloadTooLarge {
            field: "body",
            limit_bytes: state.config.body_max_bytes,
        })?;

    let request_hash = request_hash(parts.method.as_str(), parts.uri.path(), &body_bytes);

    let outcome = state
        .idempotency
        .begin(&identity.pubkey, &key, &request_hash)
        .await
        .map_err(ApiError::from)?;

    match outcome {
        IdempotencyOutcome::Started => {
            let request = Request::from_parts(parts, Body::from(body_bytes));
            let response = next.run(request).await;

            let (response_parts, response_body) = response.into_parts();
            let response_bytes = to_bytes(response_body, usize::MAX)
                .await
                .map_err(|e| ApiError::Internal(e.into()))?;

            // Stored verbatim; a replay must be byte-equal with this
            // response. Every relay response body is UTF-8 JSON.
            let body_text = std::str::from_utf8(&response_bytes).ok();
            if let Err(e) = state
                .idempotency
                .finish(
                    &identity.pubkey,
                    &key,
                    response_parts.status.as_u16() as i32,
                    body_text,
                )
                .await
            {
                // The response still goes out; the record stays in-progress
                // until the TTL sweep reclaims it.
                warn!(key = %key, error = %e, "Failed to record idempotent response");
            }

            Ok(Response::from_parts(response_parts, Body::from(response_bytes)))
        }
        IdempotencyOutcome::Replay { status, body } => {
            state.metrics.incr(&state.metrics.idempotency_replays);

            let status =
                StatusCode::from_u16(status as u16).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = body.unwrap_or_default();
            let has_body = !body.is_empty();

            let mut response = Response::builder()
                .status(status)
                .header(IDEMPOTENCY_REPLAYED_HEADER, HeaderValue::from_static("true"))
                .body(Body::from(body))
                .map_err(|e| ApiError::Internal(e.into()))?;
            if has_body {
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
            }
            Ok(response)
        }
        IdempotencyOutcome::InProgress => Err(ApiError::IdempotencyInProgress),
        IdempotencyOutcome::Conflict => Err(ApiError::IdempotencyConflict),
    }
}

fn request_hash(method: &str, path: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(path.as_bytes());
    hasher.update(b"\n");
    hasher.update(body);
    hex::encode(hasher.finalize())
}
