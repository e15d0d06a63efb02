//! Auth guard: signed request envelope verification
//!
//! Applied in front of every mutating endpoint and the job read. Checks run
//! in a fixed order: header shape, timestamp skew, signature over the
//! canonical string, then atomic nonce consumption. Authorization (buyer
//! versus seller) is the lifecycle engine's job, not this layer's.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use moltrelay_core::envelope;

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub const PUBKEY_HEADER: &str = "x-molt-pubkey";
pub const TIMESTAMP_HEADER: &str = "x-molt-timestamp";
pub const NONCE_HEADER: &str = "x-molt-nonce";
pub const SIGNATURE_HEADER: &str = "x-molt-signature";

/// The verified caller, attached to request extensions on success.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub pubkey: String,
}

struct Envelope {
    pubkey: String,
    timestamp: String,
    nonce: String,
    signature: String,
}

pub async fn require_envelope(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    state.metrics.incr(&state.metrics.requests);

    let (mut parts, body) = request.into_parts();

    let outcome = async {
        let envelope = parse_envelope(&parts.headers)?;
        check_skew(
            &envelope.timestamp,
            chrono::Utc::now().timestamp(),
            state.config.auth_skew_secs,
        )?;

        let body_bytes = to_bytes(body, state.config.body_max_bytes)
            .await
            .map_err(|_| ApiError::PayloadTooLarge {
                field: "body",
                limit_bytes: state.config.body_max_bytes,
            })?;

        let path_with_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| parts.uri.path());

        if !envelope::verify(
            parts.method.as_str(),
            path_with_query,
            &envelope.timestamp,
            &envelope.nonce,
            &body_bytes,
            &envelope.pubkey,
            &envelope.signature,
        ) {
            return Err(ApiError::InvalidSignature);
        }

        // Replay check last: a replayed nonce is only reported once the
        // signature is otherwise valid.
        if !state
            .nonces
            .consume(&envelope.pubkey, &envelope.nonce)
            .await
            .map_err(ApiError::from)?
        {
            return Err(ApiError::NonceReplay);
        }

        Ok((envelope.pubkey, body_bytes))
    }
    .await;

    let (pubkey, body_bytes) = match outcome {
        Ok(ok) => ok,
        Err(err) => {
            match &err {
                ApiError::NonceReplay => state.metrics.incr(&state.metrics.nonce_replays),
                ApiError::InvalidSignature | ApiError::TimestampSkew => {
                    state.metrics.incr(&state.metrics.auth_failures)
                }
                _ => {}
            }
            return Err(err);
        }
    };

    parts.extensions.insert(AuthIdentity { pubkey });
    let request = Request::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(request).await)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::InvalidSignature)
}

fn parse_envelope(headers: &HeaderMap) -> Result<Envelope> {
    let pubkey = header_value(headers, PUBKEY_HEADER)?;
    let timestamp = header_value(headers, TIMESTAMP_HEADER)?;
    let nonce = header_value(headers, NONCE_HEADER)?;
    let signature = header_value(headers, SIGNATURE_HEADER)?;

    if !is_lower_hex(pubkey) || pubkey.len() != 64 {
        return Err(ApiError::InvalidSignature);
    }
    if !is_lower_hex(signature) || signature.len() != 128 {
        return Err(ApiError::InvalidSignature);
    }
    if !is_lower_hex(nonce) || !(32..=64).contains(&nonce.len()) {
        return Err(ApiError::InvalidSignature);
    }

    Ok(Envelope {
        pubkey: pubkey.to_string(),
        timestamp: timestamp.to_string(),
        nonce: nonce.to_string(),
        signature: signature.to_string(),
    })
}

fn check_skew(timestamp: &str, now_secs: i64, skew_secs: i64) -> Result<()> {
    let ts: i64 = timestamp.parse().map_err(|_| ApiError::InvalidSignature)?;
    if (now_secs - ts).abs() > skew_secs {
        return Err(ApiError::TimestampSkew);
    }
    Ok(())
}

fn is_lower_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
