//! [`SqliteStore`] — the SQLite implementation of [`ListingStore`].

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::OptionalExtension as _;

use pisos_core::{
  history::{PriceChange, PriceDelta},
  listing::Listing,
  snapshot::SnapshotRecord,
  store::{
    DistrictActivity, ListingQuery, ListingStore, PassSnapshot, PriceEntry,
    RecentChange, StatsFilter, StoreFailure as _, StoreStats,
  },
  sweep::{SweepFailure, SweepSummary},
};

use crate::{
  Error, Result,
  encode::{
    RawListing, RawPriceChange, decode_status, encode_date,
    encode_orientation, encode_seller_kind, encode_status,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A listing store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. Each write
/// method is one unit of work: a price change and its history row share a
/// transaction, but nothing spans records.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// The owned column values shared by every listing write.
struct ListingValues {
  id:           String,
  title:        String,
  url:          String,
  price:        i64,
  district:     String,
  neighborhood: String,
  rooms:        Option<u32>,
  size_sqm:     Option<f64>,
  floor:        Option<String>,
  orientation:  String,
  seller_kind:  String,
  is_new_dev:   bool,
  description:  Option<String>,
}

impl ListingValues {
  fn from_record(record: &SnapshotRecord) -> Self {
    Self {
      id:           record.id.clone(),
      title:        record.title.clone(),
      url:          record.url.clone(),
      price:        record.price,
      district:     record.district.clone(),
      neighborhood: record.neighborhood.clone(),
      rooms:        record.rooms,
      size_sqm:     record.size_sqm,
      floor:        record.floor.clone(),
      orientation:  encode_orientation(record.orientation).to_owned(),
      seller_kind:  encode_seller_kind(record.seller_kind).to_owned(),
      is_new_dev:   record.is_new_development,
      description:  record.description.clone(),
    }
  }
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Trait impl ──────────────────────────────────────────────────────────────

impl ListingStore for SqliteStore {
  type Error = Error;

  // ── Pass support ──────────────────────────────────────────────────────────

  async fn pass_snapshot(&self) -> Result<PassSnapshot> {
    let rows: Vec<(String, i64, String)> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT listing_id, price, status FROM listings")?;
        let rows = stmt
          .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(id, price, status)| {
        Ok((id, PriceEntry { price, status: decode_status(&status)? }))
      })
      .collect()
  }

  // ── Writes (reconciliation) ───────────────────────────────────────────────

  async fn insert_listing(
    &self,
    record: &SnapshotRecord,
    today: NaiveDate,
  ) -> Result<()> {
    let v = ListingValues::from_record(record);
    let today_str = encode_date(today);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO listings (
             listing_id, title, url, price, district, neighborhood,
             rooms, size_sqm, floor, orientation, seller_kind,
             is_new_development, description,
             first_seen_date, last_seen_date, status
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                     ?14, ?14, 'active')",
          rusqlite::params![
            v.id,
            v.title,
            v.url,
            v.price,
            v.district,
            v.neighborhood,
            v.rooms,
            v.size_sqm,
            v.floor,
            v.orientation,
            v.seller_kind,
            v.is_new_dev,
            v.description,
            today_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn refresh_listing(
    &self,
    record: &SnapshotRecord,
    today: NaiveDate,
  ) -> Result<()> {
    let v = ListingValues::from_record(record);
    let today_str = encode_date(today);

    let updated = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE listings
           SET last_seen_date = ?1, title = ?2, rooms = ?3, size_sqm = ?4,
               floor = ?5, orientation = ?6, seller_kind = ?7
           WHERE listing_id = ?8",
          rusqlite::params![
            today_str,
            v.title,
            v.rooms,
            v.size_sqm,
            v.floor,
            v.orientation,
            v.seller_kind,
            v.id,
          ],
        )?;
        Ok(n)
      })
      .await?;

    if updated == 0 {
      return Err(Error::ListingNotFound(record.id.clone()));
    }
    Ok(())
  }

  async fn apply_price_change(
    &self,
    record: &SnapshotRecord,
    old_price: i64,
    today: NaiveDate,
  ) -> Result<PriceChange> {
    let v = ListingValues::from_record(record);
    let today_str = encode_date(today);
    let delta = PriceDelta::between(old_price, record.price);

    let seq: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let n = tx.execute(
          "UPDATE listings
           SET last_seen_date = ?1, price = ?2, title = ?3, rooms = ?4,
               size_sqm = ?5, floor = ?6, orientation = ?7, seller_kind = ?8
           WHERE listing_id = ?9",
          rusqlite::params![
            today_str,
            v.price,
            v.title,
            v.rooms,
            v.size_sqm,
            v.floor,
            v.orientation,
            v.seller_kind,
            v.id,
          ],
        )?;
        if n == 0 {
          return Ok(None);
        }

        tx.execute(
          "INSERT INTO price_history
             (listing_id, new_price, change_amount, change_percent, recorded_on)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            v.id,
            v.price,
            delta.amount,
            delta.percent,
            today_str,
          ],
        )?;
        let seq = tx.last_insert_rowid();

        tx.commit()?;
        Ok(Some(seq))
      })
      .await?;

    let sequence_id =
      seq.ok_or_else(|| Error::ListingNotFound(record.id.clone()))?;

    Ok(PriceChange {
      sequence_id,
      listing_id: record.id.clone(),
      new_price: record.price,
      delta_amount: delta.amount,
      delta_percent: delta.percent,
      recorded_on: today,
    })
  }

  async fn reactivate_listing(
    &self,
    record: &SnapshotRecord,
    old_price: i64,
    today: NaiveDate,
  ) -> Result<Option<PriceChange>> {
    let v = ListingValues::from_record(record);
    let today_str = encode_date(today);
    let price_moved = record.price != old_price;
    let delta = PriceDelta::between(old_price, record.price);

    let (updated, seq): (bool, Option<i64>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let n = tx.execute(
          "UPDATE listings
           SET status = 'active', last_seen_date = ?1, price = ?2, title = ?3,
               rooms = ?4, size_sqm = ?5, floor = ?6, orientation = ?7,
               seller_kind = ?8
           WHERE listing_id = ?9",
          rusqlite::params![
            today_str,
            v.price,
            v.title,
            v.rooms,
            v.size_sqm,
            v.floor,
            v.orientation,
            v.seller_kind,
            v.id,
          ],
        )?;
        if n == 0 {
          return Ok((false, None));
        }

        let seq = if price_moved {
          tx.execute(
            "INSERT INTO price_history
               (listing_id, new_price, change_amount, change_percent,
                recorded_on)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
              v.id,
              v.price,
              delta.amount,
              delta.percent,
              today_str,
            ],
          )?;
          Some(tx.last_insert_rowid())
        } else {
          None
        };

        tx.commit()?;
        Ok((true, seq))
      })
      .await?;

    if !updated {
      return Err(Error::ListingNotFound(record.id.clone()));
    }

    Ok(seq.map(|sequence_id| PriceChange {
      sequence_id,
      listing_id: record.id.clone(),
      new_price: record.price,
      delta_amount: delta.amount,
      delta_percent: delta.percent,
      recorded_on: today,
    }))
  }

  // ── Writes (staleness sweep) ──────────────────────────────────────────────

  async fn mark_stale_sold(
    &self,
    today: NaiveDate,
    days_threshold: u32,
  ) -> Result<SweepSummary> {
    // Stale iff today - last_seen > threshold, i.e. last_seen < cutoff.
    let cutoff =
      encode_date(today - chrono::Days::new(u64::from(days_threshold)));

    let stale_ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT listing_id FROM listings
           WHERE status = 'active' AND last_seen_date < ?1",
        )?;
        let ids = stmt
          .query_map(rusqlite::params![cutoff], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
      })
      .await?;

    // One UPDATE per listing so a single failure cannot block the rest.
    let mut summary = SweepSummary::default();
    for id in stale_ids {
      let id_param = id.clone();
      let result = self
        .conn
        .call(move |conn| {
          let n = conn.execute(
            "UPDATE listings SET status = 'sold_removed'
             WHERE listing_id = ?1 AND status = 'active'",
            rusqlite::params![id_param],
          )?;
          Ok(n)
        })
        .await;

      match result {
        Ok(n) if n > 0 => summary.transitioned += 1,
        Ok(_) => {}
        Err(e) => {
          let e = Error::from(e);
          if e.is_systemic() {
            return Err(e);
          }
          tracing::warn!(listing_id = %id, error = %e, "stale-sweep write failed");
          summary.failed.push(SweepFailure {
            listing_id: id,
            message:    e.to_string(),
          });
        }
      }
    }

    Ok(summary)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_listing(&self, id: &str) -> Result<Option<Listing>> {
    let id_param = id.to_owned();
    let raw: Option<RawListing> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM listings WHERE listing_id = ?1",
          RawListing::COLUMNS
        );
        let raw = conn
          .query_row(&sql, rusqlite::params![id_param], RawListing::from_row)
          .optional()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawListing::into_listing).transpose()
  }

  async fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>> {
    // Build WHERE clause dynamically, one cond per populated filter.
    let mut conds: Vec<String> = Vec::new();
    let mut params: Vec<rusqlite::types::Value> = Vec::new();

    if let Some(status) = query.status {
      conds.push("status = ?".to_owned());
      params.push(encode_status(status).to_owned().into());
    }
    if !query.districts.is_empty() {
      let placeholders =
        vec!["?"; query.districts.len()].join(", ");
      conds.push(format!("district IN ({placeholders})"));
      params.extend(query.districts.iter().cloned().map(Into::into));
    }
    if let Some(min) = query.min_price {
      conds.push("price >= ?".to_owned());
      params.push(min.into());
    }
    if let Some(max) = query.max_price {
      conds.push("price <= ?".to_owned());
      params.push(max.into());
    }
    if let Some(kind) = query.seller_kind {
      conds.push("seller_kind = ?".to_owned());
      params.push(encode_seller_kind(kind).to_owned().into());
    }
    if let Some(after) = query.seen_after {
      conds.push("last_seen_date >= ?".to_owned());
      params.push(encode_date(after).into());
    }
    if let Some(before) = query.seen_before {
      conds.push("last_seen_date <= ?".to_owned());
      params.push(encode_date(before).into());
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    params.push((query.limit.unwrap_or(100) as i64).into());
    params.push((query.offset.unwrap_or(0) as i64).into());

    let sql = format!(
      "SELECT {} FROM listings {where_clause}
       ORDER BY last_seen_date DESC, listing_id
       LIMIT ? OFFSET ?",
      RawListing::COLUMNS
    );

    let raws: Vec<RawListing> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawListing::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawListing::into_listing).collect()
  }

  async fn price_history(&self, id: &str) -> Result<Vec<PriceChange>> {
    let id_param = id.to_owned();
    let raws: Vec<RawPriceChange> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, listing_id, new_price, change_amount, change_percent,
                  recorded_on
           FROM price_history
           WHERE listing_id = ?1
           ORDER BY recorded_on, id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_param], RawPriceChange::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPriceChange::into_change).collect()
  }

  async fn stats(&self, filter: &StatsFilter) -> Result<StoreStats> {
    let districts = filter.districts.clone();
    let status = filter.status.map(encode_status);

    let (active, sold, mean_price, mean_price_per_sqm) = self
      .conn
      .call(move |conn| {
        let district_clause = if districts.is_empty() {
          String::new()
        } else {
          let placeholders = vec!["?"; districts.len()].join(", ");
          format!(" AND district IN ({placeholders})")
        };
        let d_params: Vec<rusqlite::types::Value> =
          districts.into_iter().map(Into::into).collect();

        let active: u64 = conn.query_row(
          &format!(
            "SELECT COUNT(*) FROM listings
             WHERE status = 'active'{district_clause}"
          ),
          rusqlite::params_from_iter(d_params.iter()),
          |r| r.get(0),
        )?;
        let sold: u64 = conn.query_row(
          &format!(
            "SELECT COUNT(*) FROM listings
             WHERE status = 'sold_removed'{district_clause}"
          ),
          rusqlite::params_from_iter(d_params.iter()),
          |r| r.get(0),
        )?;

        let mut mean_clause = district_clause.clone();
        let mut mean_params = d_params;
        if let Some(status) = status {
          mean_clause.push_str(" AND status = ?");
          mean_params.push(status.to_owned().into());
        }

        // Zero-priced rows count towards the plain mean; only the per-m²
        // mean drops rows, and only for an unusable size.
        let mean_price: Option<f64> = conn.query_row(
          &format!("SELECT AVG(price) FROM listings WHERE 1=1{mean_clause}"),
          rusqlite::params_from_iter(mean_params.iter()),
          |r| r.get(0),
        )?;
        let mean_per_sqm: Option<f64> = conn.query_row(
          &format!(
            "SELECT AVG(price * 1.0 / size_sqm) FROM listings
             WHERE size_sqm IS NOT NULL AND size_sqm > 0{mean_clause}"
          ),
          rusqlite::params_from_iter(mean_params.iter()),
          |r| r.get(0),
        )?;
        Ok((active, sold, mean_price, mean_per_sqm))
      })
      .await?;

    Ok(StoreStats {
      active_count: active,
      sold_count: sold,
      mean_price,
      mean_price_per_sqm,
    })
  }

  async fn sold_within_days(&self, today: NaiveDate, days: u32) -> Result<u64> {
    let cutoff = encode_date(today - chrono::Days::new(u64::from(days)));
    let count = self
      .conn
      .call(move |conn| {
        let count: u64 = conn.query_row(
          "SELECT COUNT(*) FROM listings
           WHERE status = 'sold_removed' AND last_seen_date >= ?1",
          rusqlite::params![cutoff],
          |r| r.get(0),
        )?;
        Ok(count)
      })
      .await?;
    Ok(count)
  }

  async fn recent_price_changes(
    &self,
    today: NaiveDate,
    window_days: u32,
    limit: usize,
  ) -> Result<Vec<RecentChange>> {
    let cutoff = encode_date(today - chrono::Days::new(u64::from(window_days)));
    let limit = limit as i64;

    let raws: Vec<(RawPriceChange, String, String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT h.id, h.listing_id, h.new_price, h.change_amount,
                  h.change_percent, h.recorded_on,
                  l.title, l.district, l.neighborhood
           FROM price_history h
           JOIN listings l ON l.listing_id = h.listing_id
           WHERE h.recorded_on >= ?1
           ORDER BY h.recorded_on DESC, h.id DESC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![cutoff, limit], |row| {
            Ok((
              RawPriceChange::from_row(row)?,
              row.get(6)?,
              row.get(7)?,
              row.get(8)?,
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(raw, title, district, neighborhood)| {
        Ok(RecentChange {
          change: raw.into_change()?,
          title,
          district,
          neighborhood,
        })
      })
      .collect()
  }

  async fn district_price_activity(
    &self,
    today: NaiveDate,
    window_days: u32,
    k: usize,
  ) -> Result<Vec<DistrictActivity>> {
    let cutoff = encode_date(today - chrono::Days::new(u64::from(window_days)));
    let k = k as i64;

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT l.district, COUNT(*) AS changes,
                  AVG(ABS(h.change_percent)) AS magnitude
           FROM price_history h
           JOIN listings l ON l.listing_id = h.listing_id
           WHERE h.recorded_on >= ?1
           GROUP BY l.district
           ORDER BY changes DESC, magnitude DESC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![cutoff, k], |row| {
            Ok(DistrictActivity {
              district:         row.get(0)?,
              change_count:     row.get(1)?,
              mean_abs_percent: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }
}
