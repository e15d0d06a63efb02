//! Jobs and the job state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The eight job states. `Delivered`, `Failed`, `Canceled`, and `Expired`
/// are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Requested,
    Quoted,
    Accepted,
    Running,
    Delivered,
    Failed,
    Canceled,
    Expired,
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Requested,
        JobStatus::Quoted,
        JobStatus::Accepted,
        JobStatus::Running,
        JobStatus::Delivered,
        JobStatus::Failed,
        JobStatus::Canceled,
        JobStatus::Expired,
    ];

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Delivered | JobStatus::Failed | JobStatus::Canceled | JobStatus::Expired
        )
    }

    /// Status pairs reachable through some engine event. The lifecycle
    /// engine consults this table before every status change. `payment`
    /// keeps the job in `accepted` and is not listed; a lease extension
    /// keeps the job in `running` and is not listed either.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (*self, next),
            (Requested, Quoted)
                | (Quoted, Accepted)
                | (Accepted, Running)
                | (Running, Delivered)
                | (Running, Failed)
                | (Requested, Canceled)
                | (Quoted, Canceled)
                | (Accepted, Canceled)
                | (Quoted, Expired)
                | (Accepted, Expired)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Requested => "requested",
            JobStatus::Quoted => "quoted",
            JobStatus::Accepted => "accepted",
            JobStatus::Running => "running",
            JobStatus::Delivered => "delivered",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(JobStatus::Requested),
            "quoted" => Ok(JobStatus::Quoted),
            "accepted" => Ok(JobStatus::Accepted),
            "running" => Ok(JobStatus::Running),
            "delivered" => Ok(JobStatus::Delivered),
            "failed" => Ok(JobStatus::Failed),
            "canceled" => Ok(JobStatus::Canceled),
            "expired" => Ok(JobStatus::Expired),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// A job row. `seller_pubkey` is copied from the offer at creation and
/// never changes; `updated_at` is bumped by a trigger on every write.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Job {
    pub job_id: Uuid,
    pub offer_id: Uuid,
    pub seller_pubkey: String,
    pub buyer_pubkey: String,
    pub status: JobStatus,
    pub request_payload: serde_json::Value,
    pub quote_amount_raw: Option<String>,
    pub quote_invoice_address: Option<String>,
    #[serde(with = "super::rfc3339_seconds_option")]
    pub quote_expires_at: Option<DateTime<Utc>>,
    pub payment_charge_id: Option<String>,
    pub payment_charge_address: Option<String>,
    pub payment_provider: Option<String>,
    pub payment_sweep_tx_hash: Option<String>,
    pub payment_tx_hash: Option<String>,
    pub lock_owner: Option<String>,
    #[serde(with = "super::rfc3339_seconds_option")]
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub result_url: Option<String>,
    pub error: Option<serde_json::Value>,
    #[serde(with = "super::rfc3339_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "super::rfc3339_seconds")]
    pub updated_at: DateTime<Utc>,
}

/// Filters for job listings (buyer/seller listing and the heartbeat query).
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub statuses: Option<Vec<JobStatus>>,
    /// When set, results are ordered ascending by `updated_at` so the filter
    /// works as a resumption cursor.
    pub updated_after: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Terminal predicate
    // -----------------------------------------------------------------------

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Delivered.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
        assert!(JobStatus::Expired.is_terminal());
        assert!(!JobStatus::Requested.is_terminal());
        assert!(!JobStatus::Quoted.is_terminal());
        assert!(!JobStatus::Accepted.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    // -----------------------------------------------------------------------
    // Transition table
    // -----------------------------------------------------------------------

    #[test]
    fn test_cancel_allowed_before_execution_only() {
        assert!(JobStatus::Requested.can_transition_to(JobStatus::Canceled));
        assert!(JobStatus::Quoted.can_transition_to(JobStatus::Canceled));
        assert!(JobStatus::Accepted.can_transition_to(JobStatus::Canceled));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Canceled));
        assert!(!JobStatus::Delivered.can_transition_to(JobStatus::Canceled));
    }

    #[test]
    fn test_happy_path_transitions_are_legal() {
        assert!(JobStatus::Requested.can_transition_to(JobStatus::Quoted));
        assert!(JobStatus::Quoted.can_transition_to(JobStatus::Accepted));
        assert!(JobStatus::Accepted.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Delivered));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        for from in JobStatus::ALL {
            if !from.is_terminal() {
                continue;
            }
            for to in JobStatus::ALL {
                assert!(
                    !from.can_transition_to(to),
                    "{} must not transition to {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!JobStatus::Requested.can_transition_to(JobStatus::Accepted));
        assert!(!JobStatus::Requested.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Quoted.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Accepted.can_transition_to(JobStatus::Delivered));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Canceled));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Expired));
        assert!(!JobStatus::Requested.can_transition_to(JobStatus::Expired));
    }

    // -----------------------------------------------------------------------
    // String round trips
    // -----------------------------------------------------------------------

    #[test]
    fn test_status_string_round_trip() {
        for status in JobStatus::ALL {
            let parsed: JobStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!("pending".parse::<JobStatus>().is_err());
        assert!("".parse::<JobStatus>().is_err());
        assert!("Requested".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Requested).unwrap(),
            "\"requested\""
        );
        let status: JobStatus = serde_json::from_str("\"expired\"").unwrap();
        assert_eq!(status, JobStatus::Expired);
    }
}
