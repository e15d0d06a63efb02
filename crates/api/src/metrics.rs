//! In-process metric counters
//!
//! Ephemeral, best-effort process state; a restart zeroes everything. The
//! snapshot is surfaced through the health endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub requests: AtomicU64,
    pub auth_failures: AtomicU64,
    pub nonce_replays: AtomicU64,
    pub rate_limited: AtomicU64,
    pub idempotency_replays: AtomicU64,
    pub job_transitions: AtomicU64,
    pub notifications: AtomicU64,
    pub heartbeat_waits: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub auth_failures: u64,
    pub nonce_replays: u64,
    pub rate_limited: u64,
    pub idempotency_replays: u64,
    pub job_transitions: u64,
    pub notifications: u64,
    pub heartbeat_waits: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            nonce_replays: self.nonce_replays.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            idempotency_replays: self.idempotency_replays.load(Ordering::Relaxed),
            job_transitions: self.job_transitions.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            heartbeat_waits: self.heartbeat_waits.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.incr(&metrics.requests);
        metrics.incr(&metrics.requests);
        metrics.incr(&metrics.job_transitions);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.job_transitions, 1);
        assert_eq!(snapshot.auth_failures, 0);
    }
}
