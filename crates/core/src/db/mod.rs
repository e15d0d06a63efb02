//! Postgres store: connection management and the per-entity stores

pub mod connection;
pub mod idempotency;
pub mod jobs;
pub mod nonces;
pub mod offers;

pub use connection::Database;
pub use idempotency::{IdempotencyOutcome, IdempotencyStore};
pub use jobs::{DeliverOutcome, JobStore};
pub use nonces::NonceStore;
pub use offers::OfferStore;
