//! Capability offers published by sellers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a seller prices work against an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "pricing_mode", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PricingMode {
    /// Every job costs `fixed_price_raw`; no negotiation.
    Fixed,
    /// The seller quotes each job individually.
    Quote,
}

/// A capability offer. Immutable once created; never deleted because jobs
/// reference it with restrict semantics.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Offer {
    pub offer_id: Uuid,
    pub seller_pubkey: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub pricing_mode: PricingMode,
    /// Nano raw units as a decimal string; present iff `pricing_mode` is fixed.
    pub fixed_price_raw: Option<String>,
    pub active: bool,
    #[serde(with = "super::rfc3339_seconds")]
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating an offer. The seller identity comes from the
/// authenticated envelope, never from the body.
#[derive(Debug, Clone)]
pub struct NewOffer {
    pub seller_pubkey: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub pricing_mode: PricingMode,
    pub fixed_price_raw: Option<String>,
}

/// Filters for the public offer listing.
#[derive(Debug, Clone, Default)]
pub struct OfferFilter {
    /// Case-insensitive substring match on title or description.
    pub q: Option<String>,
    /// AND-match: every listed tag must be present on the offer.
    pub tags: Option<Vec<String>>,
    pub seller_pubkey: Option<String>,
    pub pricing_mode: Option<PricingMode>,
    pub active: Option<bool>,
    /// Restrict to these sellers (the currently-online set); `None` disables
    /// the restriction entirely.
    pub online_sellers: Option<Vec<String>>,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_mode_serde_lowercase() {
        assert_eq!(serde_json::to_string(&PricingMode::Fixed).unwrap(), "\"fixed\"");
        assert_eq!(serde_json::to_string(&PricingMode::Quote).unwrap(), "\"quote\"");
        let mode: PricingMode = serde_json::from_str("\"quote\"").unwrap();
        assert_eq!(mode, PricingMode::Quote);
    }

    #[test]
    fn test_offer_serializes_timestamps_to_seconds() {
        let offer = Offer {
            offer_id: Uuid::nil(),
            seller_pubkey: "ab".repeat(32),
            title: "Extract".into(),
            description: "Extract structured data".into(),
            tags: vec!["scrape".into()],
            pricing_mode: PricingMode::Fixed,
            fixed_price_raw: Some("1000000".into()),
            active: true,
            created_at: chrono::DateTime::parse_from_rfc3339("2025-06-01T00:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
        };
        let json = serde_json::to_value(&offer).unwrap();
        assert_eq!(json["created_at"], "2025-06-01T00:00:00Z");
        assert_eq!(json["pricing_mode"], "fixed");
    }
}
