//! Molt Relay API Server
//!
//! The HTTP surface of the relay: signed-envelope authentication, replay
//! and idempotency defenses, scoped rate limiting, the offer catalog and
//! job lifecycle endpoints, and the seller heartbeat long poll.

pub mod auth;
pub mod error;
pub mod extract;
pub mod idempotency;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod validation;

pub use error::{ApiError, Result};
pub use server::{Server, ServerConfig};
pub use state::AppState;
