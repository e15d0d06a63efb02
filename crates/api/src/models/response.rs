//! API response models

use serde::Serialize;

use moltrelay_core::models::{Job, Offer};

use crate::metrics::MetricsSnapshot;

#[derive(Debug, Serialize)]
pub struct OfferPage {
    pub offers: Vec<Offer>,
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatPage {
    pub jobs: Vec<Job>,
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
    /// Wall time actually spent parked on the waiter.
    pub waited_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: i64,
    pub database: bool,
    pub metrics: MetricsSnapshot,
}
