//! The `ListingStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `pisos-store-sqlite`).
//! Higher layers (`pisos-api`, `pisos-cli`) and the reconciliation engine
//! depend on this abstraction, not on any concrete backend.

use std::{collections::HashMap, future::Future};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
  history::PriceChange,
  listing::{Listing, ListingStatus, SellerKind},
  snapshot::SnapshotRecord,
  sweep::SweepSummary,
};

// ─── Failure classification ──────────────────────────────────────────────────

/// Lets the engine tell a per-record write failure (skip and continue) from a
/// systemic store failure (abort the pass).
pub trait StoreFailure: std::error::Error + Send + Sync + 'static {
  /// `true` when the store as a whole is unusable — unreachable, closed, or
  /// corrupt — rather than one statement having failed.
  fn is_systemic(&self) -> bool;
}

// ─── Pass snapshot ───────────────────────────────────────────────────────────

/// What the engine knows about a persisted listing at pass start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceEntry {
  pub price:  i64,
  pub status: ListingStatus,
}

/// Immutable id → [`PriceEntry`] map covering every persisted listing,
/// loaded once per pass.
pub type PassSnapshot = HashMap<String, PriceEntry>;

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`ListingStore::list_listings`].
#[derive(Debug, Clone, Default)]
pub struct ListingQuery {
  pub status:      Option<ListingStatus>,
  /// Restrict to these districts; empty means all.
  pub districts:   Vec<String>,
  pub min_price:   Option<i64>,
  pub max_price:   Option<i64>,
  pub seller_kind: Option<SellerKind>,
  /// Inclusive bounds on `last_seen`.
  pub seen_after:  Option<NaiveDate>,
  pub seen_before: Option<NaiveDate>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

/// Filter for [`ListingStore::stats`].
#[derive(Debug, Clone, Default)]
pub struct StatsFilter {
  /// Restrict the price means to this status; `None` means all rows.
  /// The counts always break down by status regardless.
  pub status:    Option<ListingStatus>,
  /// Restrict everything to these districts; empty means all.
  pub districts: Vec<String>,
}

/// Headline aggregates over the rows matching a [`StatsFilter`].
///
/// Zero-priced rows participate in the plain price mean. The per-m² mean
/// excludes rows with an unknown or non-positive size; the counts exclude
/// nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
  pub active_count:       u64,
  pub sold_count:         u64,
  pub mean_price:         Option<f64>,
  pub mean_price_per_sqm: Option<f64>,
}

/// A price change joined with enough listing context to display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentChange {
  pub change:       PriceChange,
  pub title:        String,
  pub district:     String,
  pub neighborhood: String,
}

/// Per-district price-change activity over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictActivity {
  pub district:         String,
  pub change_count:     u64,
  /// Mean |delta_percent| over the window; `None` when every change in the
  /// window had an undefined percentage.
  pub mean_abs_percent: Option<f64>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a listing store backend.
///
/// Writes are record-granular: each mutation is its own unit of work, so an
/// interrupted pass leaves the store valid and partially reconciled. History
/// rows are append-only. Reads never mutate anything.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ListingStore: Send + Sync {
  type Error: StoreFailure;

  // ── Pass support ──────────────────────────────────────────────────────

  /// Load the id → price/status map for every persisted listing.
  /// Called once at pass start; the engine treats the result as immutable.
  fn pass_snapshot(
    &self,
  ) -> impl Future<Output = Result<PassSnapshot, Self::Error>> + Send + '_;

  // ── Writes (reconciliation) ───────────────────────────────────────────

  /// Insert a listing never seen before, with
  /// `first_seen = last_seen = today` and active status. No history row.
  fn insert_listing<'a>(
    &'a self,
    record: &'a SnapshotRecord,
    today: NaiveDate,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Re-confirm an active listing whose price is unchanged: advance
  /// `last_seen` and refresh the mutable attributes (title, rooms, size,
  /// floor, orientation, seller kind).
  fn refresh_listing<'a>(
    &'a self,
    record: &'a SnapshotRecord,
    today: NaiveDate,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Apply a detected price change: update the listing as in
  /// [`refresh_listing`](Self::refresh_listing), set the new price, and
  /// append exactly one history row — all in one transaction.
  fn apply_price_change<'a>(
    &'a self,
    record: &'a SnapshotRecord,
    old_price: i64,
    today: NaiveDate,
  ) -> impl Future<Output = Result<PriceChange, Self::Error>> + Send + 'a;

  /// Bring a sold_removed listing back to active on reappearance,
  /// preserving `first_seen` and existing history. Appends a history row
  /// iff the observed price differs from `old_price`.
  fn reactivate_listing<'a>(
    &'a self,
    record: &'a SnapshotRecord,
    old_price: i64,
    today: NaiveDate,
  ) -> impl Future<Output = Result<Option<PriceChange>, Self::Error>> + Send + 'a;

  // ── Writes (staleness sweep) ──────────────────────────────────────────

  /// Transition every active listing with
  /// `today − last_seen > days_threshold` to sold_removed.
  ///
  /// Idempotent (only active rows are selected). Per-listing write failures
  /// are collected in the summary and do not stop the sweep.
  fn mark_stale_sold(
    &self,
    today: NaiveDate,
    days_threshold: u32,
  ) -> impl Future<Output = Result<SweepSummary, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Point lookup by id. Returns `None` if not found.
  fn get_listing<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<Listing>, Self::Error>> + Send + 'a;

  /// Filtered listing rows.
  fn list_listings<'a>(
    &'a self,
    query: &'a ListingQuery,
  ) -> impl Future<Output = Result<Vec<Listing>, Self::Error>> + Send + 'a;

  /// All history rows for one listing, oldest first.
  fn price_history<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Vec<PriceChange>, Self::Error>> + Send + 'a;

  /// Headline counts and price means for the rows matching `filter`.
  fn stats<'a>(
    &'a self,
    filter: &'a StatsFilter,
  ) -> impl Future<Output = Result<StoreStats, Self::Error>> + Send + 'a;

  /// Count of listings retired within the last `days` days. The `last_seen`
  /// value at transition time doubles as the transition date.
  fn sold_within_days(
    &self,
    today: NaiveDate,
    days: u32,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Most recent price changes within a trailing window, newest first.
  fn recent_price_changes(
    &self,
    today: NaiveDate,
    window_days: u32,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<RecentChange>, Self::Error>> + Send + '_;

  /// Top-`k` districts by price-change count over a trailing window,
  /// tie-broken by mean absolute percentage, descending.
  fn district_price_activity(
    &self,
    today: NaiveDate,
    window_days: u32,
    k: usize,
  ) -> impl Future<Output = Result<Vec<DistrictActivity>, Self::Error>> + Send + '_;
}
