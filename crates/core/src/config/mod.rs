use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Postgres connection string
    pub database_url: String,

    /// Maximum number of connections in the pool (env: `MAX_CONNECTIONS`).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections maintained in the pool (env: `MIN_CONNECTIONS`).
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Timeout in seconds to wait for a connection from the pool (env: `CONNECTION_TIMEOUT_SECS`).
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Accepted clock skew between client timestamp and relay clock (env: `AUTH_SKEW_SECS`).
    #[serde(default = "default_auth_skew_secs")]
    pub auth_skew_secs: i64,

    /// Sliding replay window for request nonces (env: `NONCE_TTL_SECS`).
    #[serde(default = "default_nonce_ttl_secs")]
    pub nonce_ttl_secs: i64,

    /// Retention of recorded idempotency responses (env: `IDEMPOTENCY_TTL_SECS`).
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: i64,

    /// Token-bucket refill window (env: `RATE_WINDOW_SECS`).
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,

    /// Bucket capacity for the per-IP scope (env: `RATE_IP_LIMIT`).
    #[serde(default = "default_rate_ip_limit")]
    pub rate_ip_limit: u32,

    /// Bucket capacity for the per-pubkey scope (env: `RATE_PUBKEY_LIMIT`).
    #[serde(default = "default_rate_pubkey_limit")]
    pub rate_pubkey_limit: u32,

    /// Bucket capacity for the creation routes, both scopes (env: `RATE_STRICT_LIMIT`).
    #[serde(default = "default_rate_strict_limit")]
    pub rate_strict_limit: u32,

    /// Quote lifetime applied when the seller omits `quote_expires_at` (env: `QUOTE_DEFAULT_TTL_SECS`).
    #[serde(default = "default_quote_default_ttl_secs")]
    pub quote_default_ttl_secs: i64,

    /// Upper bound on seller-supplied quote lifetimes (env: `QUOTE_MAX_TTL_SECS`).
    #[serde(default = "default_quote_max_ttl_secs")]
    pub quote_max_ttl_secs: i64,

    /// How long an accepted job may sit unpaid before lazy expiry (env: `ACCEPT_PAYMENT_TTL_SECS`).
    #[serde(default = "default_accept_payment_ttl_secs")]
    pub accept_payment_ttl_secs: i64,

    /// Execution lease duration granted by each lock call (env: `LOCK_TTL_SECS`).
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: i64,

    /// Ceiling on the heartbeat `wait_ms` parameter (env: `HEARTBEAT_MAX_WAIT_MS`).
    #[serde(default = "default_heartbeat_max_wait_ms")]
    pub heartbeat_max_wait_ms: u64,

    /// Maximum accepted request body size in bytes (env: `BODY_MAX_BYTES`).
    #[serde(default = "default_body_max_bytes")]
    pub body_max_bytes: usize,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connection_timeout_secs() -> u64 {
    30
}

fn default_auth_skew_secs() -> i64 {
    60
}

fn default_nonce_ttl_secs() -> i64 {
    600
}

fn default_idempotency_ttl_secs() -> i64 {
    86_400
}

fn default_rate_window_secs() -> u64 {
    60
}

fn default_rate_ip_limit() -> u32 {
    120
}

fn default_rate_pubkey_limit() -> u32 {
    60
}

fn default_rate_strict_limit() -> u32 {
    30
}

fn default_quote_default_ttl_secs() -> i64 {
    900
}

fn default_quote_max_ttl_secs() -> i64 {
    3_600
}

fn default_accept_payment_ttl_secs() -> i64 {
    1_800
}

fn default_lock_ttl_secs() -> i64 {
    300
}

fn default_heartbeat_max_wait_ms() -> u64 {
    30_000
}

fn default_body_max_bytes() -> usize {
    307_200
}

impl RelayConfig {
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;
        cfg.try_deserialize()
    }

    /// Convenience constructor from environment variables.
    pub fn from_env() -> std::result::Result<Self, config::ConfigError> {
        Self::load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> RelayConfig {
        serde_json::from_value(serde_json::json!({
            "database_url": "postgresql://localhost/moltrelay"
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_match_documented_knobs() {
        let cfg = minimal();
        assert_eq!(cfg.auth_skew_secs, 60);
        assert_eq!(cfg.nonce_ttl_secs, 600);
        assert_eq!(cfg.idempotency_ttl_secs, 86_400);
        assert_eq!(cfg.rate_window_secs, 60);
        assert_eq!(cfg.rate_ip_limit, 120);
        assert_eq!(cfg.rate_pubkey_limit, 60);
        assert_eq!(cfg.rate_strict_limit, 30);
        assert_eq!(cfg.quote_default_ttl_secs, 900);
        assert_eq!(cfg.quote_max_ttl_secs, 3_600);
        assert_eq!(cfg.accept_payment_ttl_secs, 1_800);
        assert_eq!(cfg.lock_ttl_secs, 300);
        assert_eq!(cfg.heartbeat_max_wait_ms, 30_000);
        assert_eq!(cfg.body_max_bytes, 307_200);
    }

    #[test]
    fn test_database_url_is_required() {
        let result: std::result::Result<RelayConfig, _> =
            serde_json::from_value(serde_json::json!({}));
        assert!(result.is_err());
    }
}
