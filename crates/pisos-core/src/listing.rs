//! Listing — the persisted record for one observed property.
//!
//! A listing is keyed by the site-assigned external id and is never deleted.
//! The scraper re-confirms it on every pass; the staleness sweeper retires it
//! once it has gone unobserved for longer than the configured threshold.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a listing.
///
/// The transition active → sold_removed is driven solely by the staleness
/// sweeper. The reverse transition happens only when a retired id reappears
/// in a later snapshot (reactivation, which preserves `first_seen` and the
/// full price history).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
  Active,
  SoldRemoved,
}

impl ListingStatus {
  pub fn is_active(&self) -> bool { matches!(self, Self::Active) }
}

/// Which side of the market posted the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SellerKind {
  Individual,
  Agency,
}

/// Window orientation as advertised. Most listings do not state it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
  Interior,
  Exterior,
  #[default]
  Unknown,
}

/// Two-level location: administrative district plus neighbourhood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
  pub district:     String,
  pub neighborhood: String,
}

/// One row per unique external id.
///
/// `price` is in whole currency units (euros, no cents). `first_seen` is
/// immutable once set; `last_seen` only ever moves forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
  pub id:                 String,
  pub title:              String,
  pub url:                String,
  pub price:              i64,
  pub locality:           Locality,
  pub rooms:              Option<u32>,
  pub size_sqm:           Option<f64>,
  pub floor:              Option<String>,
  pub orientation:        Orientation,
  pub seller_kind:        SellerKind,
  pub is_new_development: bool,
  pub description:        Option<String>,
  pub first_seen:         NaiveDate,
  pub last_seen:          NaiveDate,
  pub status:             ListingStatus,
}

impl Listing {
  /// Days between first and last observation.
  pub fn days_on_market(&self) -> i64 {
    (self.last_seen - self.first_seen).num_days()
  }
}
