//! Job lifecycle endpoints
//!
//! Each transition delegates to the lifecycle engine and, on success, fires
//! an advisory notification towards the job's seller so a parked heartbeat
//! wakes up.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Extension;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use moltrelay_core::models::job::JobFilter;
use moltrelay_core::models::Job;

use crate::auth::AuthIdentity;
use crate::error::{ApiError, Result};
use crate::extract::Json;
use crate::models::request::{
    CreateJobRequest, DeliverRequest, ListJobsParams, PaymentRequest, QuoteRequest,
};
use crate::models::response::JobPage;
use crate::state::AppState;
use crate::validation;

fn parse_job_id(raw: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|_| ApiError::validation("job id must be a UUID"))
}

/// Mark a completed transition: count it and wake the seller.
fn transition_done(state: &AppState, job: &Job) {
    state.metrics.incr(&state.metrics.job_transitions);
    state.metrics.incr(&state.metrics.notifications);
    state.notifier.notify(&job.seller_pubkey);
}

/// Buyer creates a job against an active offer.
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthIdentity>,
    Json(body): Json<CreateJobRequest>,
) -> Result<impl IntoResponse> {
    validation::validate_create_job(&body)?;

    let job = state
        .jobs
        .create(body.offer_id, &identity.pubkey, body.request_payload)
        .await?;
    transition_done(&state, &job);

    Ok((StatusCode::CREATED, axum::Json(job)))
}

/// List jobs the caller participates in, either side.
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthIdentity>,
    Query(params): Query<ListJobsParams>,
) -> Result<axum::Json<JobPage>> {
    let filter = JobFilter {
        statuses: validation::parse_statuses_csv(params.status.as_deref())?,
        updated_after: validation::parse_instant(params.updated_after.as_deref(), "updated_after")?,
        limit: validation::parse_limit(params.limit.as_deref(), 20)?,
        offset: validation::parse_offset(params.offset.as_deref())?,
    };

    let page = state
        .jobs
        .list_for_participant(&identity.pubkey, &filter)
        .await?;

    Ok(axum::Json(JobPage {
        jobs: page.items,
        limit: page.limit,
        offset: page.offset,
        total: page.total,
    }))
}

/// Read a single job as one of its participants.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthIdentity>,
    Path(id): Path<String>,
) -> Result<axum::Json<Job>> {
    let job_id = parse_job_id(&id)?;
    let job = state.jobs.get_for(job_id, &identity.pubkey).await?;
    Ok(axum::Json(job))
}

/// Seller quotes a requested job.
pub async fn quote_job(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthIdentity>,
    Path(id): Path<String>,
    Json(body): Json<QuoteRequest>,
) -> Result<axum::Json<Job>> {
    let job_id = parse_job_id(&id)?;
    validation::validate_quote(&body, Utc::now(), state.config.quote_max_ttl_secs)?;

    let job = state
        .jobs
        .quote(
            job_id,
            &identity.pubkey,
            &body.quote_amount_raw,
            &body.quote_invoice_address,
            body.quote_expires_at,
        )
        .await?;
    transition_done(&state, &job);

    Ok(axum::Json(job))
}

/// Buyer accepts a live quote.
pub async fn accept_job(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthIdentity>,
    Path(id): Path<String>,
) -> Result<axum::Json<Job>> {
    let job_id = parse_job_id(&id)?;
    let job = state.jobs.accept(job_id, &identity.pubkey).await?;
    transition_done(&state, &job);
    Ok(axum::Json(job))
}

/// Buyer records the payment transaction hash. Write-once.
pub async fn record_payment(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthIdentity>,
    Path(id): Path<String>,
    Json(body): Json<PaymentRequest>,
) -> Result<axum::Json<Job>> {
    let job_id = parse_job_id(&id)?;
    validation::validate_payment(&body)?;

    let job = state
        .jobs
        .payment(job_id, &identity.pubkey, &body.payment_tx_hash)
        .await?;
    transition_done(&state, &job);

    Ok(axum::Json(job))
}

/// Seller acquires or extends the execution lease.
pub async fn lock_job(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthIdentity>,
    Path(id): Path<String>,
) -> Result<axum::Json<Job>> {
    let job_id = parse_job_id(&id)?;
    let job = state.jobs.lock(job_id, &identity.pubkey).await?;
    transition_done(&state, &job);
    Ok(axum::Json(job))
}

/// Seller delivers the terminal result or error.
pub async fn deliver_job(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthIdentity>,
    Path(id): Path<String>,
    Json(body): Json<DeliverRequest>,
) -> Result<axum::Json<Job>> {
    let job_id = parse_job_id(&id)?;
    let outcome = validation::validate_deliver(&body)?;

    let job = state
        .jobs
        .deliver(job_id, &identity.pubkey, outcome)
        .await?;
    transition_done(&state, &job);

    Ok(axum::Json(job))
}

/// Buyer cancels before execution starts.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthIdentity>,
    Path(id): Path<String>,
) -> Result<axum::Json<Job>> {
    let job_id = parse_job_id(&id)?;
    let job = state.jobs.cancel(job_id, &identity.pubkey).await?;
    transition_done(&state, &job);
    Ok(axum::Json(job))
}
