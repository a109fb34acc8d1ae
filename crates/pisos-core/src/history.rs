//! Price-change history records.
//!
//! History rows are strictly append-only. One row exists per *detected*
//! transition between two consecutive observed prices; the initial price at
//! insertion never produces a row. Ordered by `recorded_on` and sequence id,
//! the rows plus the insertion price reconstruct the full price trajectory.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A persisted price transition. Immutable once written, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
  /// Store-assigned, monotonically increasing.
  pub sequence_id:   i64,
  pub listing_id:    String,
  pub new_price:     i64,
  /// new − old, signed.
  pub delta_amount:  i64,
  /// 100 × delta_amount / old price. `None` when the prior price was zero
  /// (the percentage is undefined, not an error).
  pub delta_percent: Option<f64>,
  pub recorded_on:   NaiveDate,
}

/// The computed deltas of one price transition, before the store assigns a
/// sequence id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceDelta {
  pub amount:  i64,
  pub percent: Option<f64>,
}

impl PriceDelta {
  /// Signed deltas for a transition from `old` to `new`.
  pub fn between(old: i64, new: i64) -> Self {
    let amount = new - old;
    let percent = if old == 0 {
      None
    } else {
      Some(100.0 * amount as f64 / old as f64)
    };
    Self { amount, percent }
  }
}
