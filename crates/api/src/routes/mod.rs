//! API routes

pub mod health;
pub mod heartbeat;
pub mod jobs;
pub mod offers;

use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use std::sync::Arc;

use crate::middleware::rate_limit;
use crate::middleware::request_id;
use crate::state::AppState;
use crate::{auth, idempotency};

/// Create the main API router.
///
/// Mutating routes (and the job reads) run behind the full pipeline:
/// IP rate limit → auth guard → pubkey rate limit → idempotency → handler.
pub fn create_router(state: Arc<AppState>) -> Router {
    let public = Router::new().route("/v1/offers", get(offers::list_offers));

    // Layers execute outermost-last-added: auth first, then the pubkey
    // limiter, then idempotency.
    let authed = Router::new()
        .route("/v1/offers", post(offers::create_offer))
        .route("/v1/jobs", post(jobs::create_job))
        .route("/v1/jobs", get(jobs::list_jobs))
        .route("/v1/jobs/:id", get(jobs::get_job))
        .route("/v1/jobs/:id/quote", post(jobs::quote_job))
        .route("/v1/jobs/:id/accept", post(jobs::accept_job))
        .route("/v1/jobs/:id/payment", post(jobs::record_payment))
        .route("/v1/jobs/:id/lock", post(jobs::lock_job))
        .route("/v1/jobs/:id/deliver", post(jobs::deliver_job))
        .route("/v1/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/v1/seller/heartbeat", get(heartbeat::heartbeat))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            idempotency::record_or_replay,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit::pubkey_rate_limit,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::require_envelope,
        ));

    let v1 = public.merge(authed).layer(axum_middleware::from_fn_with_state(
        state.clone(),
        rate_limit::ip_rate_limit,
    ));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(v1)
        .layer(axum_middleware::from_fn(request_id::propagate_request_id))
        .with_state(state)
}
