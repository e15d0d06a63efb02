//! Declarative request-shape validation
//!
//! Field caps come from the data model; every violation is reported as a
//! `validation_error` with per-field issues in `details`. Size caps on JSON
//! payloads are measured on the serialized value after parsing and map to
//! `payload_too_large` instead.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashSet;

use moltrelay_core::db::DeliverOutcome;
use moltrelay_core::models::{JobStatus, PricingMode};

use crate::error::{ApiError, Result};
use crate::models::request::{
    CreateJobRequest, CreateOfferRequest, DeliverRequest, PaymentRequest, QuoteRequest,
};

pub const TITLE_MAX: usize = 120;
pub const DESCRIPTION_MAX: usize = 2000;
pub const TAGS_MAX: usize = 16;
pub const TAG_LEN_MAX: usize = 32;
pub const RAW_AMOUNT_MAX: usize = 40;
pub const INVOICE_ADDRESS_MAX: usize = 128;
pub const TX_HASH_MAX: usize = 128;
pub const RESULT_URL_MAX: usize = 2048;
pub const REQUEST_PAYLOAD_MAX_BYTES: usize = 64 * 1024;
pub const ERROR_MAX_BYTES: usize = 8 * 1024;

/// Collected per-field issues, reported together.
#[derive(Default)]
struct Issues(Vec<(&'static str, String)>);

impl Issues {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push((field, message.into()));
    }

    fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        let details: serde_json::Map<String, Value> = self
            .0
            .into_iter()
            .map(|(field, message)| (field.to_string(), Value::String(message)))
            .collect();
        Err(ApiError::validation_with(
            "Request failed validation",
            Value::Object(details),
        ))
    }
}

/// Decimal-integer Nano raw amount: `^[0-9]+$`, bounded length.
pub fn is_raw_amount(s: &str) -> bool {
    !s.is_empty() && s.len() <= RAW_AMOUNT_MAX && s.bytes().all(|b| b.is_ascii_digit())
}

/// UTF-8 byte length of the serialized value.
pub fn json_byte_len(value: &Value) -> usize {
    serde_json::to_vec(value).map(|b| b.len()).unwrap_or(usize::MAX)
}

pub fn validate_create_offer(req: &CreateOfferRequest) -> Result<()> {
    let mut issues = Issues::default();

    if req.title.is_empty() {
        issues.push("title", "must not be empty");
    } else if req.title.chars().count() > TITLE_MAX {
        issues.push("title", format!("must be at most {} characters", TITLE_MAX));
    }

    if req.description.chars().count() > DESCRIPTION_MAX {
        issues.push(
            "description",
            format!("must be at most {} characters", DESCRIPTION_MAX),
        );
    }

    if req.tags.len() > TAGS_MAX {
        issues.push("tags", format!("at most {} tags are allowed", TAGS_MAX));
    }
    if req.tags.iter().any(|t| t.is_empty() || t.chars().count() > TAG_LEN_MAX) {
        issues.push(
            "tags",
            format!("each tag must be 1 to {} characters", TAG_LEN_MAX),
        );
    }
    let unique: HashSet<&String> = req.tags.iter().collect();
    if unique.len() != req.tags.len() {
        issues.push("tags", "tags must be unique");
    }

    match (req.pricing_mode, &req.fixed_price_raw) {
        (PricingMode::Fixed, None) => {
            issues.push("fixed_price_raw", "required when pricing_mode is fixed");
        }
        (PricingMode::Fixed, Some(price)) if !is_raw_amount(price) => {
            issues.push("fixed_price_raw", "must be a decimal-integer raw amount");
        }
        (PricingMode::Quote, Some(_)) => {
            issues.push("fixed_price_raw", "forbidden when pricing_mode is quote");
        }
        _ => {}
    }

    issues.into_result()
}

pub fn validate_create_job(req: &CreateJobRequest) -> Result<()> {
    if !req.request_payload.is_object() {
        return Err(ApiError::validation_with(
            "Request failed validation",
            json!({ "request_payload": "must be a JSON object" }),
        ));
    }
    if json_byte_len(&req.request_payload) > REQUEST_PAYLOAD_MAX_BYTES {
        return Err(ApiError::PayloadTooLarge {
            field: "request_payload",
            limit_bytes: REQUEST_PAYLOAD_MAX_BYTES,
        });
    }
    Ok(())
}

pub fn validate_quote(req: &QuoteRequest, now: DateTime<Utc>, max_ttl_secs: i64) -> Result<()> {
    let mut issues = Issues::default();

    if !is_raw_amount(&req.quote_amount_raw) {
        issues.push("quote_amount_raw", "must be a decimal-integer raw amount");
    }
    if req.quote_invoice_address.is_empty()
        || req.quote_invoice_address.chars().count() > INVOICE_ADDRESS_MAX
    {
        issues.push(
            "quote_invoice_address",
            format!("must be 1 to {} characters", INVOICE_ADDRESS_MAX),
        );
    }
    if let Some(expires_at) = req.quote_expires_at {
        if expires_at <= now {
            issues.push("quote_expires_at", "must be in the future");
        } else if expires_at > now + Duration::seconds(max_ttl_secs) {
            issues.push(
                "quote_expires_at",
                format!("must be at most {} seconds from now", max_ttl_secs),
            );
        }
    }

    issues.into_result()
}

pub fn validate_payment(req: &PaymentRequest) -> Result<()> {
    let mut issues = Issues::default();
    if req.payment_tx_hash.is_empty() || req.payment_tx_hash.chars().count() > TX_HASH_MAX {
        issues.push(
            "payment_tx_hash",
            format!("must be 1 to {} characters", TX_HASH_MAX),
        );
    }
    issues.into_result()
}

/// Deliver carries exactly one of a result URL or a structured error.
pub fn validate_deliver(req: &DeliverRequest) -> Result<DeliverOutcome> {
    match (&req.result_url, &req.error) {
        (Some(_), Some(_)) | (None, None) => Err(ApiError::validation_with(
            "Request failed validation",
            json!({ "result_url": "exactly one of result_url or error must be set",
                    "error": "exactly one of result_url or error must be set" }),
        )),
        (Some(url), None) => {
            if url.is_empty() {
                return Err(ApiError::validation_with(
                    "Request failed validation",
                    json!({ "result_url": "must not be empty" }),
                ));
            }
            if url.len() > RESULT_URL_MAX {
                return Err(ApiError::PayloadTooLarge {
                    field: "result_url",
                    limit_bytes: RESULT_URL_MAX,
                });
            }
            Ok(DeliverOutcome::Result { url: url.clone() })
        }
        (None, Some(error)) => {
            if !error.is_object() {
                return Err(ApiError::validation_with(
                    "Request failed validation",
                    json!({ "error": "must be a JSON object" }),
                ));
            }
            if json_byte_len(error) > ERROR_MAX_BYTES {
                return Err(ApiError::PayloadTooLarge {
                    field: "error",
                    limit_bytes: ERROR_MAX_BYTES,
                });
            }
            Ok(DeliverOutcome::Error {
                error: error.clone(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Query-parameter parsing
// ---------------------------------------------------------------------------

pub fn parse_limit(raw: Option<&str>, default: i64) -> Result<i64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<i64>() {
        Ok(limit) if (1..=100).contains(&limit) => Ok(limit),
        _ => Err(ApiError::validation("limit must be an integer between 1 and 100")),
    }
}

pub fn parse_offset(raw: Option<&str>) -> Result<i64> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    match raw.parse::<i64>() {
        Ok(offset) if offset >= 0 => Ok(offset),
        _ => Err(ApiError::validation("offset must be a non-negative integer")),
    }
}

pub fn parse_bool(raw: Option<&str>, field: &'static str) -> Result<Option<bool>> {
    match raw {
        None => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(_) => Err(ApiError::validation(format!(
            "{} must be 'true' or 'false'",
            field
        ))),
    }
}

pub fn parse_statuses_csv(raw: Option<&str>) -> Result<Option<Vec<JobStatus>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let statuses: std::result::Result<Vec<JobStatus>, String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect();
    match statuses {
        Ok(statuses) if !statuses.is_empty() => Ok(Some(statuses)),
        Ok(_) => Ok(None),
        Err(message) => Err(ApiError::validation(message)),
    }
}

pub fn parse_tags_csv(raw: Option<&str>) -> Option<Vec<String>> {
    let tags: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();
    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

pub fn parse_instant(raw: Option<&str>, field: &'static str) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|_| ApiError::validation(format!("{} must be an RFC 3339 timestamp", field)))
}

pub fn parse_pricing_mode(raw: Option<&str>) -> Result<Option<PricingMode>> {
    match raw {
        None => Ok(None),
        Some("fixed") => Ok(Some(PricingMode::Fixed)),
        Some("quote") => Ok(Some(PricingMode::Quote)),
        Some(_) => Err(ApiError::validation(
            "pricing_mode must be 'fixed' or 'quote'",
        )),
    }
}

pub fn parse_wait_ms(raw: Option<&str>, max_wait_ms: u64) -> Result<u64> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    match raw.parse::<u64>() {
        Ok(wait_ms) if wait_ms <= max_wait_ms => Ok(wait_ms),
        _ => Err(ApiError::validation(format!(
            "wait_ms must be an integer between 0 and {}",
            max_wait_ms
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn offer_request(mode: PricingMode, price: Option<&str>) -> CreateOfferRequest {
        CreateOfferRequest {
            title: "Extract".into(),
            description: "Extract structured data".into(),
            tags: vec!["scrape".into()],
            pricing_mode: mode,
            fixed_price_raw: price.map(ToString::to_string),
        }
    }

    // -----------------------------------------------------------------------
    // Offer validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_offer_pricing_mode_invariant() {
        assert!(validate_create_offer(&offer_request(PricingMode::Fixed, Some("1000000"))).is_ok());
        assert!(validate_create_offer(&offer_request(PricingMode::Quote, None)).is_ok());
        assert!(validate_create_offer(&offer_request(PricingMode::Fixed, None)).is_err());
        assert!(validate_create_offer(&offer_request(PricingMode::Quote, Some("1"))).is_err());
    }

    #[test]
    fn test_offer_raw_amount_shape() {
        assert!(validate_create_offer(&offer_request(PricingMode::Fixed, Some("007"))).is_ok());
        assert!(validate_create_offer(&offer_request(PricingMode::Fixed, Some("1.5"))).is_err());
        assert!(validate_create_offer(&offer_request(PricingMode::Fixed, Some("-1"))).is_err());
        assert!(validate_create_offer(&offer_request(PricingMode::Fixed, Some(""))).is_err());
        let over = "9".repeat(41);
        assert!(validate_create_offer(&offer_request(PricingMode::Fixed, Some(&over))).is_err());
    }

    #[test]
    fn test_offer_title_boundaries() {
        let mut req = offer_request(PricingMode::Quote, None);
        req.title = "t".repeat(120);
        assert!(validate_create_offer(&req).is_ok());
        req.title = "t".repeat(121);
        assert!(validate_create_offer(&req).is_err());
        req.title = String::new();
        assert!(validate_create_offer(&req).is_err());
    }

    #[test]
    fn test_offer_tag_caps() {
        let mut req = offer_request(PricingMode::Quote, None);
        req.tags = (0..16).map(|i| format!("tag{}", i)).collect();
        assert!(validate_create_offer(&req).is_ok());
        req.tags = (0..17).map(|i| format!("tag{}", i)).collect();
        assert!(validate_create_offer(&req).is_err());

        req.tags = vec!["a".repeat(33)];
        assert!(validate_create_offer(&req).is_err());
        req.tags = vec!["dup".into(), "dup".into()];
        assert!(validate_create_offer(&req).is_err());
    }

    #[test]
    fn test_validation_details_name_fields() {
        let err = validate_create_offer(&offer_request(PricingMode::Fixed, None)).unwrap_err();
        match err {
            ApiError::Validation {
                details: Some(details),
                ..
            } => assert!(details.get("fixed_price_raw").is_some()),
            other => panic!("expected validation error with details, got {:?}", other),
        }
    }

    // -----------------------------------------------------------------------
    // Job payload size cap
    // -----------------------------------------------------------------------

    fn payload_of_serialized_size(total: usize) -> serde_json::Value {
        // {"data":"<fill>"} serializes to 11 + fill bytes.
        json!({ "data": "a".repeat(total - 11) })
    }

    #[test]
    fn test_request_payload_at_cap_accepted() {
        let req = CreateJobRequest {
            offer_id: uuid::Uuid::nil(),
            request_payload: payload_of_serialized_size(REQUEST_PAYLOAD_MAX_BYTES),
        };
        assert_eq!(json_byte_len(&req.request_payload), REQUEST_PAYLOAD_MAX_BYTES);
        assert!(validate_create_job(&req).is_ok());
    }

    #[test]
    fn test_request_payload_one_byte_over_rejected() {
        let req = CreateJobRequest {
            offer_id: uuid::Uuid::nil(),
            request_payload: payload_of_serialized_size(REQUEST_PAYLOAD_MAX_BYTES + 1),
        };
        assert!(matches!(
            validate_create_job(&req),
            Err(ApiError::PayloadTooLarge {
                field: "request_payload",
                ..
            })
        ));
    }

    #[test]
    fn test_request_payload_must_be_object() {
        let req = CreateJobRequest {
            offer_id: uuid::Uuid::nil(),
            request_payload: json!([1, 2, 3]),
        };
        assert!(matches!(
            validate_create_job(&req),
            Err(ApiError::Validation { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Quote expiry window
    // -----------------------------------------------------------------------

    fn quote_request(expires_at: Option<DateTime<Utc>>) -> QuoteRequest {
        QuoteRequest {
            quote_amount_raw: "1000000".into(),
            quote_invoice_address: "nano_1invoice".into(),
            quote_expires_at: expires_at,
        }
    }

    #[test]
    fn test_quote_ttl_boundaries() {
        let now = Utc::now();
        let max = 3600;

        assert!(validate_quote(&quote_request(None), now, max).is_ok());
        assert!(
            validate_quote(&quote_request(Some(now + Duration::seconds(3600))), now, max).is_ok()
        );
        assert!(
            validate_quote(&quote_request(Some(now + Duration::seconds(3601))), now, max).is_err()
        );
        assert!(validate_quote(&quote_request(Some(now)), now, max).is_err());
        assert!(
            validate_quote(&quote_request(Some(now - Duration::seconds(1))), now, max).is_err()
        );
    }

    // -----------------------------------------------------------------------
    // Deliver shape
    // -----------------------------------------------------------------------

    #[test]
    fn test_deliver_exactly_one_of_result_or_error() {
        let both = DeliverRequest {
            result_url: Some("https://s.example/r/1".into()),
            error: Some(json!({"code": "x"})),
        };
        assert!(validate_deliver(&both).is_err());

        let neither = DeliverRequest {
            result_url: None,
            error: None,
        };
        assert!(validate_deliver(&neither).is_err());

        let success = DeliverRequest {
            result_url: Some("https://s.example/r/1".into()),
            error: None,
        };
        assert!(matches!(
            validate_deliver(&success),
            Ok(DeliverOutcome::Result { .. })
        ));

        let failure = DeliverRequest {
            result_url: None,
            error: Some(json!({"code": "timeout"})),
        };
        assert!(matches!(
            validate_deliver(&failure),
            Ok(DeliverOutcome::Error { .. })
        ));
    }

    #[test]
    fn test_deliver_size_caps() {
        let long_url = DeliverRequest {
            result_url: Some(format!("https://s.example/{}", "a".repeat(RESULT_URL_MAX))),
            error: None,
        };
        assert!(matches!(
            validate_deliver(&long_url),
            Err(ApiError::PayloadTooLarge {
                field: "result_url",
                ..
            })
        ));

        let big_error = DeliverRequest {
            result_url: None,
            error: Some(json!({ "detail": "e".repeat(ERROR_MAX_BYTES) })),
        };
        assert!(matches!(
            validate_deliver(&big_error),
            Err(ApiError::PayloadTooLarge { field: "error", .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Query parameters
    // -----------------------------------------------------------------------

    #[test]
    fn test_limit_bounds() {
        assert_eq!(parse_limit(None, 20).unwrap(), 20);
        assert_eq!(parse_limit(Some("1"), 20).unwrap(), 1);
        assert_eq!(parse_limit(Some("100"), 20).unwrap(), 100);
        assert!(parse_limit(Some("0"), 20).is_err());
        assert!(parse_limit(Some("101"), 20).is_err());
        assert!(parse_limit(Some("ten"), 20).is_err());
    }

    #[test]
    fn test_offset_bounds() {
        assert_eq!(parse_offset(None).unwrap(), 0);
        assert_eq!(parse_offset(Some("40")).unwrap(), 40);
        assert!(parse_offset(Some("-1")).is_err());
    }

    #[test]
    fn test_statuses_csv() {
        let statuses = parse_statuses_csv(Some("requested,accepted,running"))
            .unwrap()
            .unwrap();
        assert_eq!(
            statuses,
            vec![JobStatus::Requested, JobStatus::Accepted, JobStatus::Running]
        );
        assert!(parse_statuses_csv(Some("requested,bogus")).is_err());
        assert!(parse_statuses_csv(None).unwrap().is_none());
    }

    #[test]
    fn test_wait_ms_bounds() {
        assert_eq!(parse_wait_ms(None, 30_000).unwrap(), 0);
        assert_eq!(parse_wait_ms(Some("30000"), 30_000).unwrap(), 30_000);
        assert!(parse_wait_ms(Some("30001"), 30_000).is_err());
        assert!(parse_wait_ms(Some("-5"), 30_000).is_err());
    }
}
