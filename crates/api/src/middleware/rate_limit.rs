//! Rate limiting middleware
//!
//! Token bucket per `(scope, key)` with continuous refill. The IP scope
//! runs in front of authentication; the pubkey scope runs after it. The
//! two creation routes additionally draw from stricter buckets in both
//! scopes. Buckets are process-local and best-effort: a restart forgets
//! them.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::auth::AuthIdentity;
use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Which bucket family a take draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateScope {
    Ip,
    Pubkey,
    /// Tighter buckets guarding the offer/job creation routes.
    Strict,
}

impl RateScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateScope::Ip => "ip",
            RateScope::Pubkey => "pubkey",
            RateScope::Strict => "strict",
        }
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub ip_limit: u32,
    pub pubkey_limit: u32,
    pub strict_limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            ip_limit: 120,
            pubkey_limit: 60,
            strict_limit: 30,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

struct Buckets {
    map: HashMap<(RateScope, String), Bucket>,
    last_sweep: Instant,
}

/// Shared token-bucket state.
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<Buckets>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(Buckets {
                map: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buckets> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn limit_for(&self, scope: RateScope) -> u32 {
        match scope {
            RateScope::Ip => self.config.ip_limit,
            RateScope::Pubkey => self.config.pubkey_limit,
            RateScope::Strict => self.config.strict_limit,
        }
    }

    /// Attempt to consume one token. On refusal returns the whole-second
    /// wait after which a token will be available.
    pub fn try_take(&self, scope: RateScope, key: &str) -> std::result::Result<(), u64> {
        self.try_take_at(scope, key, Instant::now())
    }

    fn try_take_at(
        &self,
        scope: RateScope,
        key: &str,
        now: Instant,
    ) -> std::result::Result<(), u64> {
        let limit = self.limit_for(scope) as f64;
        let rate = limit / self.config.window.as_secs_f64();
        let mut state = self.lock();

        // Opportunistic sweep of buckets idle for more than two windows.
        if now.duration_since(state.last_sweep) > self.config.window {
            let idle_cutoff = self.config.window * 2;
            state
                .map
                .retain(|_, bucket| now.duration_since(bucket.last_used) <= idle_cutoff);
            state.last_sweep = now;
        }

        let bucket = state
            .map
            .entry((scope, key.to_string()))
            .or_insert_with(|| Bucket {
                tokens: limit,
                last_refill: now,
                last_used: now,
            });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = limit.min(bucket.tokens + elapsed * rate);
        bucket.last_refill = now;
        bucket.last_used = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(((1.0 - bucket.tokens) / rate).ceil() as u64)
        }
    }

    fn refuse(&self, scope: RateScope, retry_after_secs: u64) -> ApiError {
        ApiError::RateLimited {
            scope: scope.as_str(),
            limit: self.limit_for(scope),
            window_secs: self.config.window.as_secs(),
            retry_after_secs,
        }
    }
}

impl From<&moltrelay_core::RelayConfig> for RateLimitConfig {
    fn from(config: &moltrelay_core::RelayConfig) -> Self {
        Self {
            window: Duration::from_secs(config.rate_window_secs),
            ip_limit: config.rate_ip_limit,
            pubkey_limit: config.rate_pubkey_limit,
            strict_limit: config.rate_strict_limit,
        }
    }
}

/// Whether a request targets one of the strictly limited creation routes.
fn is_strict_route(method: &Method, path: &str) -> bool {
    method == Method::POST && (path == "/v1/offers" || path == "/v1/jobs")
}

fn client_ip(request: &Request) -> String {
    // Prefer the proxy-supplied address, fall back to the socket peer.
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// IP-scope limiting, applied to every `/v1` route before authentication.
pub async fn ip_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let ip = client_ip(&request);
    let limiter = &state.rate_limiter;

    if let Err(retry) = limiter.try_take(RateScope::Ip, &ip) {
        state.metrics.incr(&state.metrics.rate_limited);
        return Err(limiter.refuse(RateScope::Ip, retry));
    }

    if is_strict_route(request.method(), request.uri().path()) {
        if let Err(retry) = limiter.try_take(RateScope::Strict, &format!("ip:{ip}")) {
            state.metrics.incr(&state.metrics.rate_limited);
            return Err(limiter.refuse(RateScope::Strict, retry));
        }
    }

    Ok(next.run(request).await)
}

/// Pubkey-scope limiting, applied after the auth guard has attached the
/// caller identity.
pub async fn pubkey_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let Some(identity) = request.extensions().get::<AuthIdentity>().cloned() else {
        return Ok(next.run(request).await);
    };
    let limiter = &state.rate_limiter;

    if let Err(retry) = limiter.try_take(RateScope::Pubkey, &identity.pubkey) {
        state.metrics.incr(&state.metrics.rate_limited);
        return Err(limiter.refuse(RateScope::Pubkey, retry));
    }

    if is_strict_route(request.method(), request.uri().path()) {
        if let Err(retry) = limiter.try_take(RateScope::Strict, &format!("pk:{}", identity.pubkey))
        {
            state.metrics.incr(&state.metrics.rate_limited);
            return Err(limiter.refuse(RateScope::Strict, retry));
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(window_secs: u64, ip: u32, pubkey: u32, strict: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(window_secs),
            ip_limit: ip,
            pubkey_limit: pubkey,
            strict_limit: strict,
        })
    }

    // -----------------------------------------------------------------------
    // Bucket math
    // -----------------------------------------------------------------------

    #[test]
    fn test_capacity_then_denied() {
        let limiter = limiter(60, 3, 60, 30);
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.try_take_at(RateScope::Ip, "1.2.3.4", now).is_ok());
        }
        let retry = limiter
            .try_take_at(RateScope::Ip, "1.2.3.4", now)
            .unwrap_err();
        // One token refills every 20 seconds at 3/60s.
        assert_eq!(retry, 20);
    }

    #[test]
    fn test_continuous_refill_allows_again() {
        let limiter = limiter(60, 60, 60, 30);
        let start = Instant::now();

        for _ in 0..60 {
            assert!(limiter.try_take_at(RateScope::Ip, "k", start).is_ok());
        }
        assert!(limiter.try_take_at(RateScope::Ip, "k", start).is_err());

        // One second refills exactly one token at 60/60s.
        let later = start + Duration::from_secs(1);
        assert!(limiter.try_take_at(RateScope::Ip, "k", later).is_ok());
        assert!(limiter.try_take_at(RateScope::Ip, "k", later).is_err());
    }

    #[test]
    fn test_refill_caps_at_limit() {
        let limiter = limiter(60, 5, 60, 30);
        let start = Instant::now();

        assert!(limiter.try_take_at(RateScope::Ip, "k", start).is_ok());

        // A long idle period must not accumulate beyond the capacity.
        let much_later = start + Duration::from_secs(3600);
        for _ in 0..5 {
            assert!(limiter.try_take_at(RateScope::Ip, "k", much_later).is_ok());
        }
        assert!(limiter.try_take_at(RateScope::Ip, "k", much_later).is_err());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(60, 1, 60, 30);
        let now = Instant::now();

        assert!(limiter.try_take_at(RateScope::Ip, "a", now).is_ok());
        assert!(limiter.try_take_at(RateScope::Ip, "b", now).is_ok());
        assert!(limiter.try_take_at(RateScope::Ip, "a", now).is_err());
    }

    #[test]
    fn test_scopes_are_independent() {
        let limiter = limiter(60, 1, 1, 1);
        let now = Instant::now();

        assert!(limiter.try_take_at(RateScope::Ip, "k", now).is_ok());
        assert!(limiter.try_take_at(RateScope::Pubkey, "k", now).is_ok());
        assert!(limiter.try_take_at(RateScope::Strict, "k", now).is_ok());
        assert!(limiter.try_take_at(RateScope::Ip, "k", now).is_err());
    }

    #[test]
    fn test_idle_buckets_swept_after_two_windows() {
        let limiter = limiter(60, 1, 60, 30);
        let start = Instant::now();

        assert!(limiter.try_take_at(RateScope::Ip, "old", start).is_ok());
        assert_eq!(limiter.lock().map.len(), 1);

        // A take three windows later triggers the sweep; the idle bucket
        // is dropped and only the fresh key remains.
        let later = start + Duration::from_secs(180);
        assert!(limiter.try_take_at(RateScope::Ip, "fresh", later).is_ok());
        let state = limiter.lock();
        assert_eq!(state.map.len(), 1);
        assert!(state.map.contains_key(&(RateScope::Ip, "fresh".to_string())));
    }

    // -----------------------------------------------------------------------
    // Strict-route classification
    // -----------------------------------------------------------------------

    #[test]
    fn test_strict_routes() {
        assert!(is_strict_route(&Method::POST, "/v1/offers"));
        assert!(is_strict_route(&Method::POST, "/v1/jobs"));
        assert!(!is_strict_route(&Method::GET, "/v1/offers"));
        assert!(!is_strict_route(&Method::POST, "/v1/jobs/abc/quote"));
        assert!(!is_strict_route(&Method::POST, "/v1/jobs/abc/lock"));
    }
}
