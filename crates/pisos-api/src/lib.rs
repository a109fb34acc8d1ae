//! Read-only JSON API over a [`pisos_core::store::ListingStore`].
//!
//! This is the query surface the dashboard consumes. Every route is a pure
//! read; nothing here can mutate a listing, its price, or its status.
//! Responses carry explicit counts and an `as_of` date so an empty result is
//! distinguishable from missing data.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", pisos_api::api_router(store.clone()))
//! ```

pub mod changes;
pub mod error;
pub mod listings;
pub mod stats;

use std::sync::Arc;

use axum::{Router, routing::get};
use pisos_core::store::ListingStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: ListingStore + 'static,
{
  Router::new()
    // Aggregates
    .route("/stats", get(stats::overview::<S>))
    .route("/stats/sold", get(stats::sold::<S>))
    // Listings
    .route("/listings", get(listings::list::<S>))
    .route("/listings/{id}", get(listings::get_one::<S>))
    .route("/listings/{id}/history", get(listings::history::<S>))
    // Price changes
    .route("/changes/recent", get(changes::recent::<S>))
    .route("/changes/by-district", get(changes::by_district::<S>))
    .with_state(store)
}

/// Today as a calendar date; the store deals only in dates, never times.
pub(crate) fn today() -> chrono::NaiveDate {
  chrono::Utc::now().date_naive()
}
