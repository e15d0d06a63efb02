//! Seller heartbeat long poll
//!
//! Lets an outbound-only seller discover job updates without an inbound
//! port. The first query answers immediately when it finds jobs; otherwise
//! a waiter is registered and the query re-checked before parking, so a
//! notification landing between the two cannot be lost.

use axum::extract::{Query, State};
use axum::Extension;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moltrelay_core::models::job::JobFilter;
use moltrelay_core::models::JobStatus;

use crate::auth::AuthIdentity;
use crate::error::Result;
use crate::models::request::HeartbeatParams;
use crate::models::response::HeartbeatPage;
use crate::state::AppState;
use crate::validation;

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthIdentity>,
    Query(params): Query<HeartbeatParams>,
) -> Result<axum::Json<HeartbeatPage>> {
    let statuses = validation::parse_statuses_csv(params.status.as_deref())?.unwrap_or_else(|| {
        vec![JobStatus::Requested, JobStatus::Accepted, JobStatus::Running]
    });
    let filter = JobFilter {
        statuses: Some(statuses),
        updated_after: validation::parse_instant(params.updated_after.as_deref(), "updated_after")?,
        limit: validation::parse_limit(params.limit.as_deref(), 50)?,
        offset: validation::parse_offset(params.offset.as_deref())?,
    };
    let wait_ms = validation::parse_wait_ms(
        params.wait_ms.as_deref(),
        state.config.heartbeat_max_wait_ms,
    )?;

    let start = Instant::now();
    let page = state.jobs.list_for_seller(&identity.pubkey, &filter).await?;
    if !page.items.is_empty() || wait_ms == 0 {
        return Ok(axum::Json(HeartbeatPage {
            jobs: page.items,
            limit: page.limit,
            offset: page.offset,
            total: page.total,
            waited_ms: 0,
        }));
    }

    state.metrics.incr(&state.metrics.heartbeat_waits);

    // Register before re-checking: a transition committed between the first
    // query and this point either shows up in the re-check or fires the
    // waiter, never neither.
    let waiter = state.notifier.subscribe(&identity.pubkey);

    let recheck = state.jobs.list_for_seller(&identity.pubkey, &filter).await?;
    if !recheck.items.is_empty() {
        return Ok(axum::Json(HeartbeatPage {
            jobs: recheck.items,
            limit: recheck.limit,
            offset: recheck.offset,
            total: recheck.total,
            waited_ms: start.elapsed().as_millis() as u64,
        }));
    }

    waiter.wait(Duration::from_millis(wait_ms)).await;

    // The waking commit may not be visible yet; the fresh read below is the
    // authoritative answer either way.
    let page = state.jobs.list_for_seller(&identity.pubkey, &filter).await?;
    Ok(axum::Json(HeartbeatPage {
        jobs: page.items,
        limit: page.limit,
        offset: page.offset,
        total: page.total,
        waited_ms: start.elapsed().as_millis() as u64,
    }))
}
