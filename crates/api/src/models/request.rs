//! API request models

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use moltrelay_core::models::PricingMode;

#[derive(Debug, Deserialize)]
pub struct CreateOfferRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub pricing_mode: PricingMode,
    #[serde(default)]
    pub fixed_price_raw: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub offer_id: Uuid,
    pub request_payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub quote_amount_raw: String,
    pub quote_invoice_address: String,
    /// Defaults to the configured quote TTL when omitted.
    #[serde(default)]
    pub quote_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub payment_tx_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct DeliverRequest {
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Query parameters for the public offer listing. Everything arrives as a
/// string and is parsed by the validation layer so malformed values map
/// onto the uniform error envelope.
#[derive(Debug, Default, Deserialize)]
pub struct ListOffersParams {
    pub q: Option<String>,
    /// Comma-separated; AND-matched against offer tags.
    pub tags: Option<String>,
    pub seller_pubkey: Option<String>,
    pub pricing_mode: Option<String>,
    pub active: Option<String>,
    pub online_only: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// Query parameters for the participant job listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsParams {
    /// Comma-separated subset of the job statuses.
    pub status: Option<String>,
    pub updated_after: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// Query parameters for the seller heartbeat long poll.
#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatParams {
    pub status: Option<String>,
    pub updated_after: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub wait_ms: Option<String>,
}
