//! Handlers for `/changes` routes — price-change activity views.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::NaiveDate;
use pisos_core::store::{DistrictActivity, ListingStore, RecentChange};
use serde::{Deserialize, Serialize};

use crate::{ApiError, today};

#[derive(Debug, Deserialize)]
pub struct RecentParams {
  /// Trailing window in days; defaults to 7.
  pub days:  Option<u32>,
  pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RecentResponse {
  pub as_of:   NaiveDate,
  pub days:    u32,
  pub count:   usize,
  pub changes: Vec<RecentChange>,
}

/// `GET /changes/recent[?days=N][&limit=K]`
pub async fn recent<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<RecentParams>,
) -> Result<Json<RecentResponse>, ApiError>
where
  S: ListingStore,
{
  let days = params.days.unwrap_or(7);
  let limit = params.limit.unwrap_or(50);
  let as_of = today();

  let changes = store
    .recent_price_changes(as_of, days, limit)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(RecentResponse { as_of, days, count: changes.len(), changes }))
}

#[derive(Debug, Deserialize)]
pub struct ByDistrictParams {
  /// Trailing window in days; defaults to 30.
  pub days: Option<u32>,
  /// Top-K cutoff; defaults to 10.
  pub top:  Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ByDistrictResponse {
  pub as_of:     NaiveDate,
  pub days:      u32,
  pub districts: Vec<DistrictActivity>,
}

/// `GET /changes/by-district[?days=N][&top=K]`
pub async fn by_district<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ByDistrictParams>,
) -> Result<Json<ByDistrictResponse>, ApiError>
where
  S: ListingStore,
{
  let days = params.days.unwrap_or(30);
  let top = params.top.unwrap_or(10);
  let as_of = today();

  let districts = store
    .district_price_activity(as_of, days, top)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(ByDistrictResponse { as_of, days, districts }))
}
