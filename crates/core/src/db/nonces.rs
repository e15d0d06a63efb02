//! Replay-defense nonce store
//!
//! A nonce is accepted at most once per pubkey within a sliding window.
//! Only the SHA-256 of the raw nonce is persisted. The store is the
//! authoritative replay record; replay state must survive a process
//! restart within the window.

use sqlx::PgPool;

use crate::envelope::sha256_hex;
use crate::error::Result;

pub struct NonceStore {
    pool: PgPool,
    ttl_secs: i64,
}

impl NonceStore {
    pub fn new(pool: PgPool, ttl_secs: i64) -> Self {
        Self { pool, ttl_secs }
    }

    /// Atomically consume a nonce for a pubkey.
    ///
    /// Returns `true` when the nonce was fresh and is now recorded, `false`
    /// on replay. Rows older than the window are swept before insertion.
    pub async fn consume(&self, pubkey: &str, nonce: &str) -> Result<bool> {
        sqlx::query("delete from auth_nonces where created_at < now() - make_interval(secs => $1)")
            .bind(self.ttl_secs as f64)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query(
            r#"
            insert into auth_nonces (pubkey, nonce_hash)
            values ($1, $2)
            on conflict do nothing
            "#,
        )
        .bind(pubkey)
        .bind(sha256_hex(nonce.as_bytes()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
