//! Molt Relay Core
//!
//! Authoritative state and safety machinery for the relay: the signed
//! request envelope, the Postgres-backed offer catalog and job lifecycle
//! engine, replay and idempotency stores, and the in-process seller
//! notifier.

pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod models;
pub mod notify;

pub use config::RelayConfig;
pub use db::Database;
pub use error::{CoreError, Result};
pub use notify::Notifier;
