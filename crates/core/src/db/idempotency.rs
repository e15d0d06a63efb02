//! Idempotency-key record store
//!
//! Keys are scoped per `(pubkey, key)` so independent callers can reuse the
//! same key string. A record starts with a null response; the response body
//! is recorded verbatim once the first request finishes, after which
//! repeats replay it byte-for-byte.

use sqlx::{PgPool, Row};

use crate::error::Result;

/// What the caller of [`IdempotencyStore::begin`] should do next.
#[derive(Debug)]
pub enum IdempotencyOutcome {
    /// First sight of the key; proceed with the mutation and call `finish`.
    Started,
    /// The original request completed; replay its response verbatim.
    Replay { status: i32, body: Option<String> },
    /// The original request is still running.
    InProgress,
    /// Key reused with a different request.
    Conflict,
}

pub struct IdempotencyStore {
    pool: PgPool,
    ttl_secs: i64,
}

impl IdempotencyStore {
    pub fn new(pool: PgPool, ttl_secs: i64) -> Self {
        Self { pool, ttl_secs }
    }

    /// Claim a key for a request, or report how the prior claim ended.
    ///
    /// Expired rows are swept before the claim so a key becomes reusable
    /// after the TTL.
    pub async fn begin(
        &self,
        pubkey: &str,
        key: &str,
        request_hash: &str,
    ) -> Result<IdempotencyOutcome> {
        sqlx::query(
            "delete from idempotency_keys where created_at < now() - make_interval(secs => $1)",
        )
        .bind(self.ttl_secs as f64)
        .execute(&self.pool)
        .await?;

        // Two attempts: a concurrent sweep can remove the conflicting row
        // between our insert and the follow-up read.
        for _ in 0..2 {
            let inserted = sqlx::query(
                r#"
                insert into idempotency_keys (pubkey, key, request_hash)
                values ($1, $2, $3)
                on conflict do nothing
                "#,
            )
            .bind(pubkey)
            .bind(key)
            .bind(request_hash)
            .execute(&self.pool)
            .await?;

            if inserted.rows_affected() == 1 {
                return Ok(IdempotencyOutcome::Started);
            }

            let row = sqlx::query(
                r#"
                select request_hash, response_status, response_body
                from idempotency_keys
                where pubkey = $1 and key = $2
                "#,
            )
            .bind(pubkey)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else {
                continue;
            };

            let stored_hash: String = row.get("request_hash");
            if stored_hash != request_hash {
                return Ok(IdempotencyOutcome::Conflict);
            }

            let status: Option<i32> = row.get("response_status");
            return Ok(match status {
                Some(status) => IdempotencyOutcome::Replay {
                    status,
                    body: row.get("response_body"),
                },
                None => IdempotencyOutcome::InProgress,
            });
        }

        Ok(IdempotencyOutcome::InProgress)
    }

    /// Record the response for a claimed key so later repeats can replay it
    /// byte-for-byte.
    pub async fn finish(
        &self,
        pubkey: &str,
        key: &str,
        status: i32,
        body: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            update idempotency_keys
            set response_status = $3, response_body = $4
            where pubkey = $1 and key = $2
            "#,
        )
        .bind(pubkey)
        .bind(key)
        .bind(status)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
