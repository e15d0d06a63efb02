//! Job lifecycle engine
//!
//! Every transition follows the same discipline: row-lock the job inside a
//! transaction, apply lazy expiry, re-check preconditions against the
//! (possibly expired) row, perform a single update, commit. An expiry write
//! commits even when the requested transition then fails, so a late accept
//! observes `expired` consistently on every subsequent read.

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::{CoreError, Result};
use crate::models::job::JobFilter;
use crate::models::{Job, JobStatus, Offer, Page};

/// Terminal outcome of a deliver call: exactly one of a result URL or a
/// structured error.
#[derive(Debug, Clone)]
pub enum DeliverOutcome {
    Result { url: String },
    Error { error: serde_json::Value },
}

enum PaymentAction {
    Record,
    AlreadyRecorded,
}

pub struct JobStore {
    pool: PgPool,
    quote_default_ttl_secs: i64,
    accept_payment_ttl_secs: i64,
    lock_ttl_secs: i64,
}

impl JobStore {
    pub fn new(pool: PgPool, config: &RelayConfig) -> Self {
        Self {
            pool,
            quote_default_ttl_secs: config.quote_default_ttl_secs,
            accept_payment_ttl_secs: config.accept_payment_ttl_secs,
            lock_ttl_secs: config.lock_ttl_secs,
        }
    }

    /// Create a job against an active offer. The seller identity is copied
    /// from the offer and never changes afterwards.
    pub async fn create(
        &self,
        offer_id: Uuid,
        buyer_pubkey: &str,
        request_payload: serde_json::Value,
    ) -> Result<Job> {
        let offer = sqlx::query_as::<_, Offer>("select * from offers where offer_id = $1")
            .bind(offer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::NotFound("offer"))?;

        if !offer.active {
            return Err(CoreError::InvalidState {
                status: None,
                reason: "offer is not active".into(),
            });
        }

        let job = sqlx::query_as::<_, Job>(
            r#"
            insert into jobs (job_id, offer_id, seller_pubkey, buyer_pubkey, request_payload)
            values ($1, $2, $3, $4, $5)
            returning *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(offer.offer_id)
        .bind(&offer.seller_pubkey)
        .bind(buyer_pubkey)
        .bind(&request_payload)
        .fetch_one(&self.pool)
        .await?;

        info!(job_id = %job.job_id, seller = %job.seller_pubkey, "Job created");
        Ok(job)
    }

    /// Read a job as one of its participants.
    ///
    /// Pure reads do not fire lazy expiry; a stale `quoted` row may be
    /// observed until the next mutation touches it.
    pub async fn get_for(&self, job_id: Uuid, caller: &str) -> Result<Job> {
        let job = sqlx::query_as::<_, Job>("select * from jobs where job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::NotFound("job"))?;

        if job.buyer_pubkey != caller && job.seller_pubkey != caller {
            return Err(CoreError::Forbidden {
                role: "participant",
            });
        }
        Ok(job)
    }

    /// Jobs the caller participates in, either side.
    pub async fn list_for_participant(&self, caller: &str, filter: &JobFilter) -> Result<Page<Job>> {
        self.list_where("(buyer_pubkey = $1 or seller_pubkey = $1)", caller, filter)
            .await
    }

    /// Jobs belonging to a seller, for the heartbeat query.
    pub async fn list_for_seller(&self, seller: &str, filter: &JobFilter) -> Result<Page<Job>> {
        self.list_where("seller_pubkey = $1", seller, filter).await
    }

    async fn list_where(
        &self,
        ident_clause: &str,
        ident: &str,
        filter: &JobFilter,
    ) -> Result<Page<Job>> {
        // With an `updated_after` cursor the page is ordered ascending by
        // `updated_at` so the caller can resume from the last seen instant.
        let order = if filter.updated_after.is_some() {
            "updated_at asc"
        } else {
            "created_at desc"
        };

        let sql = format!(
            r#"
            select * from jobs
            where {ident_clause}
              and ($2::job_status[] is null or status = any($2))
              and ($3::timestamptz is null or updated_at > $3)
            order by {order}
            limit $4 offset $5
            "#
        );

        let items = sqlx::query_as::<_, Job>(&sql)
            .bind(ident)
            .bind(&filter.statuses)
            .bind(filter.updated_after)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!(
            r#"
            select count(*) from jobs
            where {ident_clause}
              and ($2::job_status[] is null or status = any($2))
              and ($3::timestamptz is null or updated_at > $3)
            "#
        );

        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(ident)
            .bind(&filter.statuses)
            .bind(filter.updated_after)
            .fetch_one(&self.pool)
            .await?;

        Ok(Page {
            items,
            limit: filter.limit,
            offset: filter.offset,
            total,
        })
    }

    /// Seller quotes a requested job. `expires_at` defaults to the
    /// configured quote TTL; range validation happens at the API edge.
    pub async fn quote(
        &self,
        job_id: Uuid,
        caller: &str,
        amount_raw: &str,
        invoice_address: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Job> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let job = self.locked(&mut tx, job_id).await?;
        let job = self.expire_if_due(&mut tx, job, now).await?;

        if let Err(e) = quote_checks(&job, caller) {
            tx.commit().await?;
            return Err(e);
        }

        let expires_at =
            expires_at.unwrap_or(now + Duration::seconds(self.quote_default_ttl_secs));

        let updated = sqlx::query_as::<_, Job>(
            r#"
            update jobs
            set status = 'quoted',
                quote_amount_raw = $2,
                quote_invoice_address = $3,
                quote_expires_at = $4
            where job_id = $1
            returning *
            "#,
        )
        .bind(job_id)
        .bind(amount_raw)
        .bind(invoice_address)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        log_transition(&job, &updated, "seller");
        Ok(updated)
    }

    /// Buyer accepts a live quote.
    pub async fn accept(&self, job_id: Uuid, caller: &str) -> Result<Job> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let job = self.locked(&mut tx, job_id).await?;
        let job = self.expire_if_due(&mut tx, job, now).await?;

        if let Err(e) = accept_checks(&job, caller) {
            tx.commit().await?;
            return Err(e);
        }

        let updated = sqlx::query_as::<_, Job>(
            "update jobs set status = 'accepted' where job_id = $1 returning *",
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        log_transition(&job, &updated, "buyer");
        Ok(updated)
    }

    /// Buyer records the Nano transaction hash. Write-once: re-sending the
    /// identical hash is an idempotent success, a different hash is a
    /// conflict. The status does not change.
    pub async fn payment(&self, job_id: Uuid, caller: &str, tx_hash: &str) -> Result<Job> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let job = self.locked(&mut tx, job_id).await?;
        let job = self.expire_if_due(&mut tx, job, now).await?;

        let action = match payment_checks(&job, caller, tx_hash) {
            Ok(action) => action,
            Err(e) => {
                tx.commit().await?;
                return Err(e);
            }
        };

        if let PaymentAction::AlreadyRecorded = action {
            tx.commit().await?;
            return Ok(job);
        }

        let updated = sqlx::query_as::<_, Job>(
            "update jobs set payment_tx_hash = $2 where job_id = $1 returning *",
        )
        .bind(job_id)
        .bind(tx_hash)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(job_id = %job_id, "Payment hash recorded");
        Ok(updated)
    }

    /// Seller acquires or extends the execution lease. A paid `accepted` job
    /// moves to `running`; a `running` job's lease is extended by its owner,
    /// or seized once the previous lease has lapsed.
    pub async fn lock(&self, job_id: Uuid, caller: &str) -> Result<Job> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let job = self.locked(&mut tx, job_id).await?;
        let job = self.expire_if_due(&mut tx, job, now).await?;

        if let Err(e) = lock_checks(&job, caller, now) {
            tx.commit().await?;
            return Err(e);
        }

        let updated = sqlx::query_as::<_, Job>(
            r#"
            update jobs
            set status = 'running', lock_owner = $2, lock_expires_at = $3
            where job_id = $1
            returning *
            "#,
        )
        .bind(job_id)
        .bind(caller)
        .bind(now + Duration::seconds(self.lock_ttl_secs))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        log_transition(&job, &updated, "seller");
        Ok(updated)
    }

    /// Seller delivers the terminal outcome while holding a live lease.
    pub async fn deliver(&self, job_id: Uuid, caller: &str, outcome: DeliverOutcome) -> Result<Job> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let job = self.locked(&mut tx, job_id).await?;
        let job = self.expire_if_due(&mut tx, job, now).await?;

        if let Err(e) = deliver_checks(&job, caller, now) {
            tx.commit().await?;
            return Err(e);
        }

        let updated = match &outcome {
            DeliverOutcome::Result { url } => {
                sqlx::query_as::<_, Job>(
                    "update jobs set status = 'delivered', result_url = $2 where job_id = $1 returning *",
                )
                .bind(job_id)
                .bind(url)
                .fetch_one(&mut *tx)
                .await?
            }
            DeliverOutcome::Error { error } => {
                sqlx::query_as::<_, Job>(
                    "update jobs set status = 'failed', error = $2 where job_id = $1 returning *",
                )
                .bind(job_id)
                .bind(error)
                .fetch_one(&mut *tx)
                .await?
            }
        };
        tx.commit().await?;

        log_transition(&job, &updated, "seller");
        Ok(updated)
    }

    /// Buyer cancels before execution starts. Clears any lock lease.
    pub async fn cancel(&self, job_id: Uuid, caller: &str) -> Result<Job> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let job = self.locked(&mut tx, job_id).await?;
        let job = self.expire_if_due(&mut tx, job, now).await?;

        if let Err(e) = cancel_checks(&job, caller) {
            tx.commit().await?;
            return Err(e);
        }

        let updated = sqlx::query_as::<_, Job>(
            r#"
            update jobs
            set status = 'canceled', lock_owner = null, lock_expires_at = null
            where job_id = $1
            returning *
            "#,
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        log_transition(&job, &updated, "buyer");
        Ok(updated)
    }

    async fn locked(&self, tx: &mut Transaction<'_, Postgres>, job_id: Uuid) -> Result<Job> {
        sqlx::query_as::<_, Job>("select * from jobs where job_id = $1 for update")
            .bind(job_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(CoreError::NotFound("job"))
    }

    async fn expire_if_due(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        job: Job,
        now: DateTime<Utc>,
    ) -> Result<Job> {
        if !expiry_due(&job, now, self.accept_payment_ttl_secs) {
            return Ok(job);
        }

        let expired = sqlx::query_as::<_, Job>(
            "update jobs set status = 'expired' where job_id = $1 returning *",
        )
        .bind(job.job_id)
        .fetch_one(&mut **tx)
        .await?;

        info!(
            job_id = %job.job_id,
            from = %job.status,
            to = %expired.status,
            "Job expired lazily"
        );
        Ok(expired)
    }
}

fn log_transition(before: &Job, after: &Job, actor: &str) {
    info!(
        job_id = %after.job_id,
        from = %before.status,
        to = %after.status,
        actor,
        "Job transition"
    );
}

/// Expiry predicates evaluated under the row lock. A quote expires at its
/// deadline (inclusive); an accepted job expires once it has sat unpaid for
/// the full payment window.
fn expiry_due(job: &Job, now: DateTime<Utc>, accept_payment_ttl_secs: i64) -> bool {
    match job.status {
        JobStatus::Quoted => job.quote_expires_at.is_some_and(|t| t <= now),
        JobStatus::Accepted => {
            job.payment_tx_hash.is_none()
                && job.updated_at + Duration::seconds(accept_payment_ttl_secs) <= now
        }
        _ => false,
    }
}

fn quote_checks(job: &Job, caller: &str) -> Result<()> {
    if job.seller_pubkey != caller {
        return Err(CoreError::Forbidden { role: "seller" });
    }
    if !job.status.can_transition_to(JobStatus::Quoted) {
        return Err(CoreError::invalid_state(
            job.status,
            "only a requested job can be quoted",
        ));
    }
    Ok(())
}

fn accept_checks(job: &Job, caller: &str) -> Result<()> {
    if job.buyer_pubkey != caller {
        return Err(CoreError::Forbidden { role: "buyer" });
    }
    if job.status.can_transition_to(JobStatus::Accepted) {
        return Ok(());
    }
    match job.status {
        JobStatus::Expired => Err(CoreError::invalid_state(job.status, "quote has expired")),
        status => Err(CoreError::invalid_state(
            status,
            "only a quoted job can be accepted",
        )),
    }
}

fn payment_checks(job: &Job, caller: &str, tx_hash: &str) -> Result<PaymentAction> {
    if job.buyer_pubkey != caller {
        return Err(CoreError::Forbidden { role: "buyer" });
    }
    if job.status != JobStatus::Accepted {
        return Err(CoreError::invalid_state(
            job.status,
            "payment can only be recorded on an accepted job",
        ));
    }
    match &job.payment_tx_hash {
        None => Ok(PaymentAction::Record),
        Some(existing) if existing == tx_hash => Ok(PaymentAction::AlreadyRecorded),
        Some(_) => Err(CoreError::invalid_state(
            job.status,
            "payment transaction hash is already recorded",
        )),
    }
}

fn lock_checks(job: &Job, caller: &str, now: DateTime<Utc>) -> Result<()> {
    if job.seller_pubkey != caller {
        return Err(CoreError::Forbidden { role: "seller" });
    }
    if job.status.can_transition_to(JobStatus::Running) {
        // First lock: the accepted job must be paid for.
        if job.payment_tx_hash.is_none() {
            return Err(CoreError::invalid_state(
                job.status,
                "payment must be recorded before locking",
            ));
        }
        return Ok(());
    }
    match job.status {
        JobStatus::Running => {
            // The lease can be seized only once the previous one has lapsed.
            if let Some(owner) = &job.lock_owner {
                if owner != caller && job.lock_expires_at.is_some_and(|t| t > now) {
                    return Err(CoreError::invalid_state(
                        job.status,
                        "lock held by another seller",
                    ));
                }
            }
            Ok(())
        }
        status => Err(CoreError::invalid_state(
            status,
            "job is not ready for execution",
        )),
    }
}

fn deliver_checks(job: &Job, caller: &str, now: DateTime<Utc>) -> Result<()> {
    if job.seller_pubkey != caller {
        return Err(CoreError::Forbidden { role: "seller" });
    }
    if !job.status.can_transition_to(JobStatus::Delivered) {
        return Err(CoreError::invalid_state(
            job.status,
            "only a running job can be delivered",
        ));
    }
    if job.lock_owner.as_deref() != Some(caller) {
        return Err(CoreError::invalid_state(
            job.status,
            "lock held by another seller",
        ));
    }
    if !job.lock_expires_at.is_some_and(|t| t > now) {
        return Err(CoreError::invalid_state(
            job.status,
            "execution lock has expired",
        ));
    }
    Ok(())
}

fn cancel_checks(job: &Job, caller: &str) -> Result<()> {
    if job.buyer_pubkey != caller {
        return Err(CoreError::Forbidden { role: "buyer" });
    }
    if !job.status.can_transition_to(JobStatus::Canceled) {
        return Err(CoreError::invalid_state(
            job.status,
            "job can no longer be canceled",
        ));
    }
    Ok(())
}
