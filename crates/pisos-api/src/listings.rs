//! Handlers for `/listings` routes.
//!
//! Query params map directly onto [`ListingQuery`] fields; `districts` is
//! accepted as a comma-separated string.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::NaiveDate;
use pisos_core::{
  history::PriceChange,
  listing::{Listing, ListingStatus, SellerKind},
  store::{ListingQuery, ListingStore},
};
use serde::{Deserialize, Serialize};

use crate::ApiError;

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  pub status:      Option<ListingStatus>,
  /// Comma-separated district names, e.g. `Centro,Salamanca`.
  pub districts:   Option<String>,
  pub min_price:   Option<i64>,
  pub max_price:   Option<i64>,
  pub seller_kind: Option<SellerKind>,
  pub seen_after:  Option<NaiveDate>,
  pub seen_before: Option<NaiveDate>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
  pub count:    usize,
  pub listings: Vec<Listing>,
}

/// `GET /listings[?status=...][&districts=...][&min_price=...]...`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError>
where
  S: ListingStore,
{
  let query = ListingQuery {
    status:      params.status,
    districts:   params
      .districts
      .map(|s| s.split(',').map(|d| d.trim().to_owned()).collect())
      .unwrap_or_default(),
    min_price:   params.min_price,
    max_price:   params.max_price,
    seller_kind: params.seller_kind,
    seen_after:  params.seen_after,
    seen_before: params.seen_before,
    limit:       params.limit,
    offset:      params.offset,
  };

  let listings =
    store.list_listings(&query).await.map_err(ApiError::store)?;
  Ok(Json(ListResponse { count: listings.len(), listings }))
}

/// `GET /listings/{id}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<String>,
) -> Result<Json<Listing>, ApiError>
where
  S: ListingStore,
{
  store
    .get_listing(&id)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("listing {id}")))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
  pub listing_id:    String,
  pub current_price: i64,
  pub count:         usize,
  /// Detected transitions, oldest first. Walking them backwards from
  /// `current_price` reconstructs the full trajectory.
  pub changes:       Vec<PriceChange>,
}

/// `GET /listings/{id}/history`
pub async fn history<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError>
where
  S: ListingStore,
{
  let listing = store
    .get_listing(&id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("listing {id}")))?;

  let changes = store.price_history(&id).await.map_err(ApiError::store)?;
  Ok(Json(HistoryResponse {
    listing_id:    listing.id,
    current_price: listing.price,
    count:         changes.len(),
    changes,
  }))
}
