//! Shared application state

use moltrelay_core::config::RelayConfig;
use moltrelay_core::db::{Database, IdempotencyStore, JobStore, NonceStore, OfferStore};
use moltrelay_core::Notifier;

use crate::metrics::Metrics;
use crate::middleware::{RateLimitConfig, RateLimiter};

/// Application state shared across all handlers
pub struct AppState {
    pub config: RelayConfig,
    pub db: Database,
    pub offers: OfferStore,
    pub jobs: JobStore,
    pub nonces: NonceStore,
    pub idempotency: IdempotencyStore,
    pub notifier: Notifier,
    pub rate_limiter: RateLimiter,
    pub metrics: Metrics,
    pub version: String,
}

impl AppState {
    pub fn new(db: Database, config: RelayConfig) -> Self {
        let pool = db.pool().clone();
        Self {
            offers: OfferStore::new(pool.clone()),
            jobs: JobStore::new(pool.clone(), &config),
            nonces: NonceStore::new(pool.clone(), config.nonce_ttl_secs),
            idempotency: IdempotencyStore::new(pool, config.idempotency_ttl_secs),
            notifier: Notifier::new(),
            rate_limiter: RateLimiter::new(RateLimitConfig::from(&config)),
            metrics: Metrics::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            db,
            config,
        }
    }
}
