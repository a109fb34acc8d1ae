//! The reconciliation engine.
//!
//! One pass merges a finite sequence of snapshot records against the store's
//! persisted state. Classification is a pure function of the record, the
//! immutable pass snapshot, and the set of ids already consumed this pass;
//! applying the resulting action is the only part that touches the store.
//!
//! Every record's mutation is its own unit of work. A failed write is
//! reported and skipped; only a systemic store failure aborts the pass, and
//! even then the mutations already applied stay committed.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  snapshot::SnapshotRecord,
  store::{ListingStore, PassSnapshot, StoreFailure as _},
};

// ─── Classification ──────────────────────────────────────────────────────────

/// What one snapshot record means, relative to persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  /// Id never seen before: insert with a fresh lifecycle, no history row.
  Insert,
  /// Active id, same price: advance `last_seen`, refresh attributes.
  Refresh,
  /// Active id, different price: update plus exactly one history row.
  ChangePrice { old_price: i64 },
  /// Retired id reappeared: back to active, history preserved.
  Reactivate { old_price: i64 },
  /// Same id already consumed earlier in this pass: no-op.
  DuplicateInPass,
}

/// Classify `record` against the pass snapshot. Pure; does not mutate.
pub fn classify(
  record: &SnapshotRecord,
  snapshot: &PassSnapshot,
  seen: &HashSet<String>,
) -> Action {
  if seen.contains(&record.id) {
    return Action::DuplicateInPass;
  }
  match snapshot.get(&record.id) {
    None => Action::Insert,
    Some(entry) if entry.status.is_active() => {
      if entry.price == record.price {
        Action::Refresh
      } else {
        Action::ChangePrice { old_price: entry.price }
      }
    }
    Some(entry) => Action::Reactivate { old_price: entry.price },
  }
}

// ─── Pass outcome ────────────────────────────────────────────────────────────

/// One record the store refused to write. The pass keeps going.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFailure {
  pub listing_id: String,
  pub message:    String,
}

/// Aggregate counters for one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassSummary {
  pub inserted:                u64,
  pub updated_no_price_change: u64,
  pub price_changed:           u64,
  /// Duplicate ids within the same pass; the first applied sighting wins.
  /// A failed write is not a sighting, so a later duplicate retries.
  pub unchanged:               u64,
  pub reactivated:             u64,
  /// Records that failed boundary validation.
  pub rejected:                u64,
  pub failed:                  Vec<RecordFailure>,
}

impl PassSummary {
  /// Records that resulted in a store mutation.
  pub fn mutated(&self) -> u64 {
    self.inserted
      + self.updated_no_price_change
      + self.price_changed
      + self.reactivated
  }
}

/// A systemic store failure ended the pass early. Mutations applied before
/// the failure remain committed; `partial` counts them.
#[derive(Debug, Error)]
#[error("reconciliation pass aborted: {source}")]
pub struct PassAborted<E: std::error::Error> {
  pub partial: PassSummary,
  #[source]
  pub source:  E,
}

// ─── Pass driver ─────────────────────────────────────────────────────────────

/// Run one reconciliation pass: load the pass snapshot, stream `records`
/// through classification, and apply each resulting mutation to `store`.
///
/// Records are consumed exactly once, in order. The sequence is finite and
/// not restartable; stopping early (by aborting on a systemic failure)
/// leaves the store valid and partially reconciled.
pub async fn run_pass<S, I>(
  store: &S,
  today: NaiveDate,
  records: I,
) -> Result<PassSummary, PassAborted<S::Error>>
where
  S: ListingStore,
  I: IntoIterator<Item = SnapshotRecord>,
{
  let snapshot = store.pass_snapshot().await.map_err(|source| PassAborted {
    partial: PassSummary::default(),
    source,
  })?;

  tracing::info!(known = snapshot.len(), %today, "reconciliation pass started");

  let mut summary = PassSummary::default();
  let mut seen: HashSet<String> = HashSet::new();

  for record in records {
    if let Err(reason) = record.validate() {
      tracing::warn!(error = %reason, "rejecting malformed snapshot record");
      summary.rejected += 1;
      continue;
    }

    let action = classify(&record, &snapshot, &seen);
    if action == Action::DuplicateInPass {
      summary.unchanged += 1;
      continue;
    }

    let result = match action {
      Action::Insert => {
        store.insert_listing(&record, today).await.map(|()| {
          summary.inserted += 1;
        })
      }
      Action::Refresh => {
        store.refresh_listing(&record, today).await.map(|()| {
          summary.updated_no_price_change += 1;
        })
      }
      Action::ChangePrice { old_price } => {
        store.apply_price_change(&record, old_price, today).await.map(
          |change| {
            tracing::debug!(
              listing_id = %record.id,
              delta = change.delta_amount,
              "price change recorded"
            );
            summary.price_changed += 1;
          },
        )
      }
      Action::Reactivate { old_price } => {
        store.reactivate_listing(&record, old_price, today).await.map(|_| {
          summary.reactivated += 1;
        })
      }
      Action::DuplicateInPass => unreachable!("handled before apply"),
    };

    match result {
      // Only an applied write marks the id as seen; a duplicate of a
      // failed record gets another attempt.
      Ok(()) => {
        seen.insert(record.id.clone());
      }
      Err(e) if e.is_systemic() => {
        tracing::error!(error = %e, "systemic store failure; aborting pass");
        return Err(PassAborted { partial: summary, source: e });
      }
      Err(e) => {
        tracing::warn!(listing_id = %record.id, error = %e, "record write failed");
        summary.failed.push(RecordFailure {
          listing_id: record.id.clone(),
          message:    e.to_string(),
        });
      }
    }
  }

  tracing::info!(
    inserted = summary.inserted,
    updated = summary.updated_no_price_change,
    price_changed = summary.price_changed,
    unchanged = summary.unchanged,
    reactivated = summary.reactivated,
    rejected = summary.rejected,
    failed = summary.failed.len(),
    "reconciliation pass complete"
  );

  Ok(summary)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::{
    listing::{ListingStatus, Orientation, SellerKind},
    memstore::MemoryStore,
    store::ListingStore,
    sweep::sweep_stale,
  };

  fn date(s: &str) -> NaiveDate { s.parse().unwrap() }

  fn record(id: &str, price: i64) -> SnapshotRecord {
    SnapshotRecord {
      id:                 id.to_owned(),
      title:              format!("Piso {id}"),
      url:                format!("https://example.com/{id}"),
      price,
      district:           "Centro".to_owned(),
      neighborhood:       "Sol".to_owned(),
      rooms:              Some(3),
      size_sqm:           Some(85.0),
      floor:              Some("2º".to_owned()),
      orientation:        Orientation::Exterior,
      seller_kind:        SellerKind::Agency,
      is_new_development: false,
      description:        None,
    }
  }

  #[tokio::test]
  async fn first_sight_inserts_without_history() {
    let store = MemoryStore::new();
    let today = date("2026-08-01");

    let summary =
      run_pass(&store, today, vec![record("A", 300_000)]).await.unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.price_changed, 0);

    let listing = store.get_listing("A").await.unwrap().unwrap();
    assert_eq!(listing.price, 300_000);
    assert_eq!(listing.first_seen, today);
    assert_eq!(listing.last_seen, today);
    assert!(store.price_history("A").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn re_observation_same_price_only_moves_last_seen() {
    let store = MemoryStore::new();
    run_pass(&store, date("2026-08-01"), vec![record("A", 300_000)])
      .await
      .unwrap();

    let summary =
      run_pass(&store, date("2026-08-02"), vec![record("A", 300_000)])
        .await
        .unwrap();
    assert_eq!(summary.updated_no_price_change, 1);
    assert_eq!(summary.inserted, 0);

    let listing = store.get_listing("A").await.unwrap().unwrap();
    assert_eq!(listing.price, 300_000);
    assert_eq!(listing.first_seen, date("2026-08-01"));
    assert_eq!(listing.last_seen, date("2026-08-02"));
    assert_eq!(listing.status, ListingStatus::Active);
    assert!(store.price_history("A").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn price_drop_records_one_signed_history_row() {
    let store = MemoryStore::new();
    run_pass(&store, date("2026-08-01"), vec![record("A", 300_000)])
      .await
      .unwrap();

    let summary =
      run_pass(&store, date("2026-08-02"), vec![record("A", 285_000)])
        .await
        .unwrap();
    assert_eq!(summary.price_changed, 1);

    let history = store.price_history("A").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].new_price, 285_000);
    assert_eq!(history[0].delta_amount, -15_000);
    assert_eq!(history[0].delta_percent, Some(-5.0));
    assert_eq!(history[0].recorded_on, date("2026-08-02"));
  }

  #[tokio::test]
  async fn n_distinct_prices_leave_n_minus_one_rows() {
    let store = MemoryStore::new();
    let prices = [300_000, 295_000, 295_000, 280_000, 310_000];
    for (i, price) in prices.iter().enumerate() {
      let day = date("2026-08-01") + chrono::Days::new(i as u64);
      run_pass(&store, day, vec![record("A", *price)]).await.unwrap();
    }
    // Four distinct consecutive prices were observed, so three transitions.
    assert_eq!(store.price_history("A").await.unwrap().len(), 3);
  }

  #[tokio::test]
  async fn zero_prior_price_gives_undefined_percent() {
    let store = MemoryStore::new();
    run_pass(&store, date("2026-08-01"), vec![record("A", 0)]).await.unwrap();
    run_pass(&store, date("2026-08-02"), vec![record("A", 200_000)])
      .await
      .unwrap();

    let history = store.price_history("A").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].delta_amount, 200_000);
    assert_eq!(history[0].delta_percent, None);
  }

  #[tokio::test]
  async fn malformed_records_are_counted_not_fatal() {
    let store = MemoryStore::new();
    let records = vec![
      record("", 100_000),
      record("A", -1),
      record("B", 250_000),
    ];

    let summary = run_pass(&store, date("2026-08-01"), records).await.unwrap();
    assert_eq!(summary.rejected, 2);
    assert_eq!(summary.inserted, 1);
    assert!(store.get_listing("B").await.unwrap().is_some());
  }

  #[tokio::test]
  async fn duplicate_id_in_one_pass_is_a_no_op() {
    let store = MemoryStore::new();
    let records = vec![record("A", 300_000), record("A", 290_000)];

    let summary = run_pass(&store, date("2026-08-01"), records).await.unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.unchanged, 1);

    // First sighting wins; the duplicate produced no history row.
    let listing = store.get_listing("A").await.unwrap().unwrap();
    assert_eq!(listing.price, 300_000);
    assert!(store.price_history("A").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn duplicate_of_a_failed_record_is_retried_not_swallowed() {
    let mut store = MemoryStore::new();
    store.refuse_ids.insert("A".to_owned());

    let records = vec![record("A", 300_000), record("A", 300_000)];
    let summary = run_pass(&store, date("2026-08-01"), records).await.unwrap();

    // Neither sighting landed, so both failures are reported and nothing
    // is filed under the duplicate counter.
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.unchanged, 0);
    assert_eq!(summary.failed.len(), 2);
    assert!(store.get_listing("A").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn record_write_failure_does_not_abort_the_pass() {
    let mut store = MemoryStore::new();
    store.refuse_ids.insert("B".to_owned());

    let records =
      vec![record("A", 100_000), record("B", 200_000), record("C", 300_000)];
    let summary = run_pass(&store, date("2026-08-01"), records).await.unwrap();

    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].listing_id, "B");
    assert!(store.get_listing("C").await.unwrap().is_some());
  }

  #[tokio::test]
  async fn systemic_failure_aborts_but_keeps_prior_mutations() {
    let mut store = MemoryStore::new();
    store.unreachable_ids.insert("B".to_owned());

    let records =
      vec![record("A", 100_000), record("B", 200_000), record("C", 300_000)];
    let err = run_pass(&store, date("2026-08-01"), records)
      .await
      .expect_err("systemic failure must abort");

    assert_eq!(err.partial.inserted, 1);
    assert!(store.get_listing("A").await.unwrap().is_some());
    // The record after the failure was never consumed.
    assert!(store.get_listing("C").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn reactivation_preserves_first_seen_and_history() {
    let store = MemoryStore::new();
    run_pass(&store, date("2026-08-01"), vec![record("A", 300_000)])
      .await
      .unwrap();
    run_pass(&store, date("2026-08-02"), vec![record("A", 290_000)])
      .await
      .unwrap();

    // Ten days of silence retires the listing.
    sweep_stale(&store, date("2026-08-12"), 7).await.unwrap();
    assert_eq!(
      store.get_listing("A").await.unwrap().unwrap().status,
      ListingStatus::SoldRemoved
    );

    // It comes back at a new price.
    let summary =
      run_pass(&store, date("2026-08-15"), vec![record("A", 280_000)])
        .await
        .unwrap();
    assert_eq!(summary.reactivated, 1);

    let listing = store.get_listing("A").await.unwrap().unwrap();
    assert_eq!(listing.status, ListingStatus::Active);
    assert_eq!(listing.first_seen, date("2026-08-01"));
    assert_eq!(listing.price, 280_000);

    // The old row plus the cross-gap transition keep the trajectory whole.
    let history = store.price_history("A").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].delta_amount, -10_000);
  }

  #[tokio::test]
  async fn reactivation_at_the_same_price_adds_no_history() {
    let store = MemoryStore::new();
    run_pass(&store, date("2026-08-01"), vec![record("A", 300_000)])
      .await
      .unwrap();
    sweep_stale(&store, date("2026-08-12"), 7).await.unwrap();

    run_pass(&store, date("2026-08-15"), vec![record("A", 300_000)])
      .await
      .unwrap();
    assert!(store.price_history("A").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn partial_pass_does_not_trigger_false_sweeps() {
    let store = MemoryStore::new();
    let day1 = date("2026-08-01");
    run_pass(&store, day1, vec![record("A", 1), record("B", 2)])
      .await
      .unwrap();

    // Next day's pass only covers A; sweeping immediately afterwards must
    // not retire B, whose absence is a single day.
    let day2 = date("2026-08-02");
    run_pass(&store, day2, vec![record("A", 1)]).await.unwrap();
    let swept = sweep_stale(&store, day2, 7).await.unwrap();
    assert_eq!(swept.transitioned, 0);

    let b = store.get_listing("B").await.unwrap().unwrap();
    assert_eq!(b.status, ListingStatus::Active);
  }

  #[tokio::test]
  async fn sweep_is_idempotent() {
    let store = MemoryStore::new();
    run_pass(&store, date("2026-08-01"), vec![record("A", 1)]).await.unwrap();

    let first = sweep_stale(&store, date("2026-08-12"), 7).await.unwrap();
    assert_eq!(first.transitioned, 1);

    let second = sweep_stale(&store, date("2026-08-12"), 7).await.unwrap();
    assert_eq!(second.transitioned, 0);
  }

  #[tokio::test]
  async fn sweep_failure_on_one_listing_does_not_block_the_rest() {
    let mut store = MemoryStore::new();
    run_pass(&store, date("2026-08-01"), vec![record("A", 1), record("B", 2)])
      .await
      .unwrap();
    store.refuse_ids.insert("A".to_owned());

    let swept = sweep_stale(&store, date("2026-08-12"), 7).await.unwrap();
    assert_eq!(swept.transitioned, 1);
    assert_eq!(swept.failed.len(), 1);
    assert_eq!(swept.failed[0].listing_id, "A");
  }
}
