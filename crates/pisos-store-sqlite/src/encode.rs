//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Calendar dates are stored as `YYYY-MM-DD` strings (no time of day). Enums
//! are stored as lowercase snake_case strings matching their serde names.

use chrono::NaiveDate;
use pisos_core::{
  history::PriceChange,
  listing::{Listing, ListingStatus, Locality, Orientation, SellerKind},
};

use crate::{Error, Result};

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── ListingStatus ───────────────────────────────────────────────────────────

pub fn encode_status(s: ListingStatus) -> &'static str {
  match s {
    ListingStatus::Active => "active",
    ListingStatus::SoldRemoved => "sold_removed",
  }
}

pub fn decode_status(s: &str) -> Result<ListingStatus> {
  match s {
    "active" => Ok(ListingStatus::Active),
    "sold_removed" => Ok(ListingStatus::SoldRemoved),
    other => Err(Error::UnknownEnumValue {
      column: "status",
      value:  other.to_owned(),
    }),
  }
}

// ─── Orientation ─────────────────────────────────────────────────────────────

pub fn encode_orientation(o: Orientation) -> &'static str {
  match o {
    Orientation::Interior => "interior",
    Orientation::Exterior => "exterior",
    Orientation::Unknown => "unknown",
  }
}

pub fn decode_orientation(s: &str) -> Result<Orientation> {
  match s {
    "interior" => Ok(Orientation::Interior),
    "exterior" => Ok(Orientation::Exterior),
    "unknown" => Ok(Orientation::Unknown),
    other => Err(Error::UnknownEnumValue {
      column: "orientation",
      value:  other.to_owned(),
    }),
  }
}

// ─── SellerKind ──────────────────────────────────────────────────────────────

pub fn encode_seller_kind(k: SellerKind) -> &'static str {
  match k {
    SellerKind::Individual => "individual",
    SellerKind::Agency => "agency",
  }
}

pub fn decode_seller_kind(s: &str) -> Result<SellerKind> {
  match s {
    "individual" => Ok(SellerKind::Individual),
    "agency" => Ok(SellerKind::Agency),
    other => Err(Error::UnknownEnumValue {
      column: "seller_kind",
      value:  other.to_owned(),
    }),
  }
}

// ─── Row-mapping structs ─────────────────────────────────────────────────────

/// A `listings` row as it comes off the wire, before text columns are
/// decoded into domain types.
pub struct RawListing {
  pub listing_id:         String,
  pub title:              String,
  pub url:                String,
  pub price:              i64,
  pub district:           String,
  pub neighborhood:       String,
  pub rooms:              Option<u32>,
  pub size_sqm:           Option<f64>,
  pub floor:              Option<String>,
  pub orientation:        String,
  pub seller_kind:        String,
  pub is_new_development: bool,
  pub description:        Option<String>,
  pub first_seen_date:    String,
  pub last_seen_date:     String,
  pub status:             String,
}

impl RawListing {
  /// Column list matching the field order expected by [`from_row`](Self::from_row).
  pub const COLUMNS: &'static str = "listing_id, title, url, price, district, \
     neighborhood, rooms, size_sqm, floor, orientation, seller_kind, \
     is_new_development, description, first_seen_date, last_seen_date, status";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      listing_id:         row.get(0)?,
      title:              row.get(1)?,
      url:                row.get(2)?,
      price:              row.get(3)?,
      district:           row.get(4)?,
      neighborhood:       row.get(5)?,
      rooms:              row.get(6)?,
      size_sqm:           row.get(7)?,
      floor:              row.get(8)?,
      orientation:        row.get(9)?,
      seller_kind:        row.get(10)?,
      is_new_development: row.get(11)?,
      description:        row.get(12)?,
      first_seen_date:    row.get(13)?,
      last_seen_date:     row.get(14)?,
      status:             row.get(15)?,
    })
  }

  pub fn into_listing(self) -> Result<Listing> {
    Ok(Listing {
      id:                 self.listing_id,
      title:              self.title,
      url:                self.url,
      price:              self.price,
      locality:           Locality {
        district:     self.district,
        neighborhood: self.neighborhood,
      },
      rooms:              self.rooms,
      size_sqm:           self.size_sqm,
      floor:              self.floor,
      orientation:        decode_orientation(&self.orientation)?,
      seller_kind:        decode_seller_kind(&self.seller_kind)?,
      is_new_development: self.is_new_development,
      description:        self.description,
      first_seen:         decode_date(&self.first_seen_date)?,
      last_seen:          decode_date(&self.last_seen_date)?,
      status:             decode_status(&self.status)?,
    })
  }
}

/// A `price_history` row before date decoding.
pub struct RawPriceChange {
  pub id:             i64,
  pub listing_id:     String,
  pub new_price:      i64,
  pub change_amount:  i64,
  pub change_percent: Option<f64>,
  pub recorded_on:    String,
}

impl RawPriceChange {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      listing_id:     row.get(1)?,
      new_price:      row.get(2)?,
      change_amount:  row.get(3)?,
      change_percent: row.get(4)?,
      recorded_on:    row.get(5)?,
    })
  }

  pub fn into_change(self) -> Result<PriceChange> {
    Ok(PriceChange {
      sequence_id:   self.id,
      listing_id:    self.listing_id,
      new_price:     self.new_price,
      delta_amount:  self.change_amount,
      delta_percent: self.change_percent,
      recorded_on:   decode_date(&self.recorded_on)?,
    })
  }
}
