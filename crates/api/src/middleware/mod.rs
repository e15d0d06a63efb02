//! Request-pipeline middleware

pub mod rate_limit;
pub mod request_id;

pub use rate_limit::{RateLimitConfig, RateLimiter, RateScope};
pub use request_id::RequestId;
