//! Handlers for `GET /stats` and `GET /stats/sold`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::NaiveDate;
use pisos_core::{
  listing::ListingStatus,
  store::{ListingStore, StatsFilter, StoreStats},
};
use serde::{Deserialize, Serialize};

use crate::{ApiError, today};

#[derive(Debug, Deserialize, Default)]
pub struct StatsParams {
  /// Restrict the price means to this status.
  pub status:    Option<ListingStatus>,
  /// Comma-separated district names, e.g. `Centro,Salamanca`.
  pub districts: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
  pub as_of: NaiveDate,
  #[serde(flatten)]
  pub stats: StoreStats,
}

/// `GET /stats[?status=...][&districts=...]`
pub async fn overview<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<StatsParams>,
) -> Result<Json<StatsResponse>, ApiError>
where
  S: ListingStore,
{
  let filter = StatsFilter {
    status:    params.status,
    districts: params
      .districts
      .map(|s| s.split(',').map(|d| d.trim().to_owned()).collect())
      .unwrap_or_default(),
  };
  let stats = store.stats(&filter).await.map_err(ApiError::store)?;
  Ok(Json(StatsResponse { as_of: today(), stats }))
}

#[derive(Debug, Deserialize)]
pub struct SoldParams {
  /// Trailing window in days; defaults to 30.
  pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SoldResponse {
  pub as_of:      NaiveDate,
  pub days:       u32,
  pub sold_count: u64,
}

/// `GET /stats/sold[?days=N]`
pub async fn sold<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<SoldParams>,
) -> Result<Json<SoldResponse>, ApiError>
where
  S: ListingStore,
{
  let days = params.days.unwrap_or(30);
  let as_of = today();
  let sold_count = store
    .sold_within_days(as_of, days)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(SoldResponse { as_of, days, sold_count }))
}
