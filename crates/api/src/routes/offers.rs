//! Offer catalog endpoints

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Extension;
use std::sync::Arc;
use tracing::debug;

use moltrelay_core::models::offer::{NewOffer, OfferFilter};

use crate::auth::AuthIdentity;
use crate::error::Result;
use crate::extract::Json;
use crate::models::request::{CreateOfferRequest, ListOffersParams};
use crate::models::response::OfferPage;
use crate::state::AppState;
use crate::validation;

/// Create an offer. The seller identity comes from the authenticated
/// envelope, never from the body.
pub async fn create_offer(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<AuthIdentity>,
    Json(body): Json<CreateOfferRequest>,
) -> Result<impl IntoResponse> {
    validation::validate_create_offer(&body)?;

    let offer = state
        .offers
        .create(NewOffer {
            seller_pubkey: identity.pubkey,
            title: body.title,
            description: body.description,
            tags: body.tags,
            pricing_mode: body.pricing_mode,
            fixed_price_raw: body.fixed_price_raw,
        })
        .await?;

    Ok((StatusCode::CREATED, axum::Json(offer)))
}

/// Public offer search with filters and pagination.
pub async fn list_offers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOffersParams>,
) -> Result<axum::Json<OfferPage>> {
    let limit = validation::parse_limit(params.limit.as_deref(), 20)?;
    let offset = validation::parse_offset(params.offset.as_deref())?;
    let online_only = validation::parse_bool(params.online_only.as_deref(), "online_only")?
        .unwrap_or(false);

    let online_sellers = if online_only {
        let sellers = state.notifier.online_sellers();
        if sellers.is_empty() {
            // No seller is online: the page is empty by definition.
            return Ok(axum::Json(OfferPage {
                offers: Vec::new(),
                limit,
                offset,
                total: 0,
            }));
        }
        Some(sellers)
    } else {
        None
    };

    let filter = OfferFilter {
        q: params.q.clone(),
        tags: validation::parse_tags_csv(params.tags.as_deref()),
        seller_pubkey: params.seller_pubkey.clone(),
        pricing_mode: validation::parse_pricing_mode(params.pricing_mode.as_deref())?,
        active: Some(validation::parse_bool(params.active.as_deref(), "active")?.unwrap_or(true)),
        online_sellers,
        limit,
        offset,
    };

    debug!(?filter, "Listing offers");
    let page = state.offers.list(&filter).await?;

    Ok(axum::Json(OfferPage {
        offers: page.items,
        limit: page.limit,
        offset: page.offset,
        total: page.total,
    }))
}
