//! In-memory [`ListingStore`] test double.
//!
//! Lets the reconciliation engine and sweeper be exercised without a live
//! database, including injected per-record and systemic write failures.

use std::{
  collections::HashSet,
  sync::Mutex,
};

use chrono::NaiveDate;
use thiserror::Error;

use crate::{
  history::{PriceChange, PriceDelta},
  listing::{Listing, ListingStatus, Locality},
  snapshot::SnapshotRecord,
  store::{
    DistrictActivity, ListingQuery, ListingStore, PassSnapshot, PriceEntry,
    RecentChange, StatsFilter, StoreFailure, StoreStats,
  },
  sweep::{SweepFailure, SweepSummary, is_stale},
};

#[derive(Debug, Error)]
pub enum MemError {
  #[error("write refused for listing {0}")]
  Refused(String),

  #[error("store unreachable")]
  Unreachable,

  #[error("listing not found: {0}")]
  Missing(String),
}

impl StoreFailure for MemError {
  fn is_systemic(&self) -> bool { matches!(self, Self::Unreachable) }
}

#[derive(Default)]
struct Inner {
  listings: Vec<Listing>,
  history:  Vec<PriceChange>,
  next_seq: i64,
}

/// A listing store held entirely in memory.
///
/// `refuse_ids` makes writes for those ids fail transiently;
/// `unreachable_ids` makes them fail systemically.
#[derive(Default)]
pub struct MemoryStore {
  inner:               Mutex<Inner>,
  pub refuse_ids:      HashSet<String>,
  pub unreachable_ids: HashSet<String>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  fn check_write(&self, id: &str) -> Result<(), MemError> {
    if self.unreachable_ids.contains(id) {
      return Err(MemError::Unreachable);
    }
    if self.refuse_ids.contains(id) {
      return Err(MemError::Refused(id.to_owned()));
    }
    Ok(())
  }

  fn materialise(record: &SnapshotRecord, today: NaiveDate) -> Listing {
    Listing {
      id:                 record.id.clone(),
      title:              record.title.clone(),
      url:                record.url.clone(),
      price:              record.price,
      locality:           Locality {
        district:     record.district.clone(),
        neighborhood: record.neighborhood.clone(),
      },
      rooms:              record.rooms,
      size_sqm:           record.size_sqm,
      floor:              record.floor.clone(),
      orientation:        record.orientation,
      seller_kind:        record.seller_kind,
      is_new_development: record.is_new_development,
      description:        record.description.clone(),
      first_seen:         today,
      last_seen:          today,
      status:             ListingStatus::Active,
    }
  }

  fn append_history(
    inner: &mut Inner,
    id: &str,
    old_price: i64,
    new_price: i64,
    today: NaiveDate,
  ) -> PriceChange {
    let delta = PriceDelta::between(old_price, new_price);
    inner.next_seq += 1;
    let change = PriceChange {
      sequence_id:   inner.next_seq,
      listing_id:    id.to_owned(),
      new_price,
      delta_amount:  delta.amount,
      delta_percent: delta.percent,
      recorded_on:   today,
    };
    inner.history.push(change.clone());
    change
  }
}

impl ListingStore for MemoryStore {
  type Error = MemError;

  async fn pass_snapshot(&self) -> Result<PassSnapshot, MemError> {
    let inner = self.inner.lock().unwrap();
    Ok(
      inner
        .listings
        .iter()
        .map(|l| {
          (l.id.clone(), PriceEntry { price: l.price, status: l.status })
        })
        .collect(),
    )
  }

  async fn insert_listing(
    &self,
    record: &SnapshotRecord,
    today: NaiveDate,
  ) -> Result<(), MemError> {
    self.check_write(&record.id)?;
    let mut inner = self.inner.lock().unwrap();
    inner.listings.push(Self::materialise(record, today));
    Ok(())
  }

  async fn refresh_listing(
    &self,
    record: &SnapshotRecord,
    today: NaiveDate,
  ) -> Result<(), MemError> {
    self.check_write(&record.id)?;
    let mut inner = self.inner.lock().unwrap();
    let listing = inner
      .listings
      .iter_mut()
      .find(|l| l.id == record.id)
      .ok_or_else(|| MemError::Missing(record.id.clone()))?;
    listing.last_seen = today;
    listing.title = record.title.clone();
    listing.rooms = record.rooms;
    listing.size_sqm = record.size_sqm;
    listing.floor = record.floor.clone();
    listing.orientation = record.orientation;
    listing.seller_kind = record.seller_kind;
    Ok(())
  }

  async fn apply_price_change(
    &self,
    record: &SnapshotRecord,
    old_price: i64,
    today: NaiveDate,
  ) -> Result<PriceChange, MemError> {
    self.check_write(&record.id)?;
    let mut inner = self.inner.lock().unwrap();
    let listing = inner
      .listings
      .iter_mut()
      .find(|l| l.id == record.id)
      .ok_or_else(|| MemError::Missing(record.id.clone()))?;
    listing.last_seen = today;
    listing.price = record.price;
    Ok(Self::append_history(
      &mut inner,
      &record.id,
      old_price,
      record.price,
      today,
    ))
  }

  async fn reactivate_listing(
    &self,
    record: &SnapshotRecord,
    old_price: i64,
    today: NaiveDate,
  ) -> Result<Option<PriceChange>, MemError> {
    self.check_write(&record.id)?;
    let mut inner = self.inner.lock().unwrap();
    let listing = inner
      .listings
      .iter_mut()
      .find(|l| l.id == record.id)
      .ok_or_else(|| MemError::Missing(record.id.clone()))?;
    listing.status = ListingStatus::Active;
    listing.last_seen = today;
    listing.price = record.price;
    if record.price == old_price {
      return Ok(None);
    }
    Ok(Some(Self::append_history(
      &mut inner,
      &record.id,
      old_price,
      record.price,
      today,
    )))
  }

  async fn mark_stale_sold(
    &self,
    today: NaiveDate,
    days_threshold: u32,
  ) -> Result<SweepSummary, MemError> {
    let mut inner = self.inner.lock().unwrap();
    let mut summary = SweepSummary::default();
    for listing in &mut inner.listings {
      if !listing.status.is_active()
        || !is_stale(listing.last_seen, today, days_threshold)
      {
        continue;
      }
      if self.refuse_ids.contains(&listing.id) {
        summary.failed.push(SweepFailure {
          listing_id: listing.id.clone(),
          message:    "write refused".to_owned(),
        });
        continue;
      }
      listing.status = ListingStatus::SoldRemoved;
      summary.transitioned += 1;
    }
    Ok(summary)
  }

  async fn get_listing(&self, id: &str) -> Result<Option<Listing>, MemError> {
    let inner = self.inner.lock().unwrap();
    Ok(inner.listings.iter().find(|l| l.id == id).cloned())
  }

  async fn list_listings(
    &self,
    query: &ListingQuery,
  ) -> Result<Vec<Listing>, MemError> {
    let inner = self.inner.lock().unwrap();
    Ok(
      inner
        .listings
        .iter()
        .filter(|l| query.status.is_none_or(|s| l.status == s))
        .cloned()
        .collect(),
    )
  }

  async fn price_history(&self, id: &str) -> Result<Vec<PriceChange>, MemError> {
    let inner = self.inner.lock().unwrap();
    Ok(
      inner
        .history
        .iter()
        .filter(|c| c.listing_id == id)
        .cloned()
        .collect(),
    )
  }

  async fn stats(&self, filter: &StatsFilter) -> Result<StoreStats, MemError> {
    let inner = self.inner.lock().unwrap();
    let rows: Vec<&Listing> = inner
      .listings
      .iter()
      .filter(|l| {
        filter.districts.is_empty()
          || filter.districts.contains(&l.locality.district)
      })
      .collect();
    let active_count =
      rows.iter().filter(|l| l.status.is_active()).count() as u64;

    let mean_rows: Vec<&&Listing> = rows
      .iter()
      .filter(|l| filter.status.is_none_or(|s| l.status == s))
      .collect();
    // Zero-priced rows stay in the plain mean; only an unusable size drops
    // a row from the per-m² mean.
    let mean_price = (!mean_rows.is_empty()).then(|| {
      mean_rows.iter().map(|l| l.price).sum::<i64>() as f64
        / mean_rows.len() as f64
    });
    let per_sqm: Vec<f64> = mean_rows
      .iter()
      .filter_map(|l| {
        l.size_sqm.filter(|s| *s > 0.0).map(|s| l.price as f64 / s)
      })
      .collect();
    let mean_price_per_sqm = (!per_sqm.is_empty())
      .then(|| per_sqm.iter().sum::<f64>() / per_sqm.len() as f64);

    Ok(StoreStats {
      active_count,
      sold_count: rows.len() as u64 - active_count,
      mean_price,
      mean_price_per_sqm,
    })
  }

  async fn sold_within_days(
    &self,
    today: NaiveDate,
    days: u32,
  ) -> Result<u64, MemError> {
    let cutoff = today - chrono::Days::new(u64::from(days));
    let inner = self.inner.lock().unwrap();
    Ok(
      inner
        .listings
        .iter()
        .filter(|l| !l.status.is_active() && l.last_seen >= cutoff)
        .count() as u64,
    )
  }

  async fn recent_price_changes(
    &self,
    _today: NaiveDate,
    _window_days: u32,
    _limit: usize,
  ) -> Result<Vec<RecentChange>, MemError> {
    Ok(Vec::new())
  }

  async fn district_price_activity(
    &self,
    _today: NaiveDate,
    _window_days: u32,
    _k: usize,
  ) -> Result<Vec<DistrictActivity>, MemError> {
    Ok(Vec::new())
  }
}
