//! The staleness sweeper.
//!
//! Runs after a completed reconciliation pass and retires listings that have
//! gone unobserved for longer than the configured threshold. Staleness is an
//! absolute-date comparison on `last_seen`, never a same-pass seen/unseen
//! set, so an interrupted or partial pass cannot cause false positives: a
//! listing is only retired after a sustained absence.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::ListingStore;

/// Default absence threshold in days. The scrape cadence is once daily, so a
/// week of absence means several consecutive missed passes.
pub const DEFAULT_DAYS_THRESHOLD: u32 = 7;

/// One listing the sweep failed to transition. The sweep keeps going.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepFailure {
  pub listing_id: String,
  pub message:    String,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepSummary {
  pub transitioned: u64,
  pub failed:       Vec<SweepFailure>,
}

/// Whether a listing last observed on `last_seen` counts as stale on `today`.
///
/// The boundary is strict: exactly `days_threshold` days of absence is still
/// considered present.
pub fn is_stale(last_seen: NaiveDate, today: NaiveDate, days_threshold: u32) -> bool {
  (today - last_seen).num_days() > i64::from(days_threshold)
}

/// Run the sweep against `store` and log the outcome.
pub async fn sweep_stale<S: ListingStore>(
  store: &S,
  today: NaiveDate,
  days_threshold: u32,
) -> Result<SweepSummary, S::Error> {
  let summary = store.mark_stale_sold(today, days_threshold).await?;

  if summary.failed.is_empty() {
    tracing::info!(
      transitioned = summary.transitioned,
      days_threshold,
      "staleness sweep complete"
    );
  } else {
    tracing::warn!(
      transitioned = summary.transitioned,
      failed = summary.failed.len(),
      days_threshold,
      "staleness sweep complete with per-listing failures"
    );
  }

  Ok(summary)
}
