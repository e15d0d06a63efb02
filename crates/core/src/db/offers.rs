//! Offer catalog store

use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::offer::{NewOffer, OfferFilter};
use crate::models::{Offer, Page};

pub struct OfferStore {
    pool: PgPool,
}

impl OfferStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new offer and return the stored row.
    pub async fn create(&self, new_offer: NewOffer) -> Result<Offer> {
        let offer = sqlx::query_as::<_, Offer>(
            r#"
            insert into offers
                (offer_id, seller_pubkey, title, description, tags, pricing_mode, fixed_price_raw)
            values ($1, $2, $3, $4, $5, $6, $7)
            returning *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_offer.seller_pubkey)
        .bind(&new_offer.title)
        .bind(&new_offer.description)
        .bind(&new_offer.tags)
        .bind(new_offer.pricing_mode)
        .bind(&new_offer.fixed_price_raw)
        .fetch_one(&self.pool)
        .await?;

        debug!(offer_id = %offer.offer_id, seller = %offer.seller_pubkey, "Offer created");
        Ok(offer)
    }

    pub async fn get(&self, offer_id: Uuid) -> Result<Option<Offer>> {
        let offer = sqlx::query_as::<_, Offer>("select * from offers where offer_id = $1")
            .bind(offer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(offer)
    }

    /// List offers matching the filter, newest first.
    pub async fn list(&self, filter: &OfferFilter) -> Result<Page<Offer>> {
        let items = sqlx::query_as::<_, Offer>(
            r#"
            select * from offers
            where ($1::text is null
                   or title ilike '%' || $1 || '%'
                   or description ilike '%' || $1 || '%')
              and ($2::text[] is null or tags @> $2)
              and ($3::text is null or seller_pubkey = $3)
              and ($4::pricing_mode is null or pricing_mode = $4)
              and ($5::boolean is null or active = $5)
              and ($6::text[] is null or seller_pubkey = any($6))
            order by created_at desc
            limit $7 offset $8
            "#,
        )
        .bind(&filter.q)
        .bind(&filter.tags)
        .bind(&filter.seller_pubkey)
        .bind(filter.pricing_mode)
        .bind(filter.active)
        .bind(&filter.online_sellers)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            select count(*) from offers
            where ($1::text is null
                   or title ilike '%' || $1 || '%'
                   or description ilike '%' || $1 || '%')
              and ($2::text[] is null or tags @> $2)
              and ($3::text is null or seller_pubkey = $3)
              and ($4::pricing_mode is null or pricing_mode = $4)
              and ($5::boolean is null or active = $5)
              and ($6::text[] is null or seller_pubkey = any($6))
            "#,
        )
        .bind(&filter.q)
        .bind(&filter.tags)
        .bind(&filter.seller_pubkey)
        .bind(filter.pricing_mode)
        .bind(filter.active)
        .bind(&filter.online_sellers)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page {
            items,
            limit: filter.limit,
            offset: filter.offset,
            total,
        })
    }
}
