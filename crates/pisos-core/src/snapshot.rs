//! The validated input schema at the snapshot-producer boundary.
//!
//! The scraper (an external collaborator) emits one [`SnapshotRecord`] per
//! listing observed in a pass. Validation happens here, at the boundary, so
//! malformed input never reaches the reconciliation logic.

use serde::{Deserialize, Serialize};

use crate::{
  Error,
  listing::{Orientation, SellerKind},
};

/// One observed listing, as delivered by the snapshot producer.
///
/// Optional fields model "unknown" at the source: the listing page simply
/// did not state rooms, size, floor, or orientation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
  pub id:                 String,
  pub title:              String,
  pub url:                String,
  pub price:              i64,
  pub district:           String,
  pub neighborhood:       String,
  #[serde(default)]
  pub rooms:              Option<u32>,
  #[serde(default)]
  pub size_sqm:           Option<f64>,
  #[serde(default)]
  pub floor:              Option<String>,
  #[serde(default)]
  pub orientation:        Orientation,
  pub seller_kind:        SellerKind,
  #[serde(default)]
  pub is_new_development: bool,
  #[serde(default)]
  pub description:        Option<String>,
}

impl SnapshotRecord {
  /// Check the constraints a record must satisfy before reconciliation:
  /// a non-empty id and a non-negative price.
  ///
  /// A failing record is skipped and counted by the engine; it never aborts
  /// the pass.
  pub fn validate(&self) -> Result<(), Error> {
    if self.id.trim().is_empty() {
      return Err(Error::EmptyId);
    }
    if self.price < 0 {
      return Err(Error::NegativePrice(self.id.clone(), self.price));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(id: &str, price: i64) -> SnapshotRecord {
    SnapshotRecord {
      id:                 id.to_owned(),
      title:              "Piso en venta".to_owned(),
      url:                "https://example.com/1".to_owned(),
      price,
      district:           "Centro".to_owned(),
      neighborhood:       "Sol".to_owned(),
      rooms:              Some(2),
      size_sqm:           Some(70.0),
      floor:              None,
      orientation:        Orientation::Unknown,
      seller_kind:        SellerKind::Agency,
      is_new_development: false,
      description:        None,
    }
  }

  #[test]
  fn valid_record_passes() {
    assert!(record("A1", 300_000).validate().is_ok());
  }

  #[test]
  fn zero_price_is_valid() {
    assert!(record("A1", 0).validate().is_ok());
  }

  #[test]
  fn empty_id_rejected() {
    assert!(matches!(record("", 1000).validate(), Err(Error::EmptyId)));
    assert!(matches!(record("  ", 1000).validate(), Err(Error::EmptyId)));
  }

  #[test]
  fn negative_price_rejected() {
    assert!(matches!(
      record("A1", -5).validate(),
      Err(Error::NegativePrice(_, -5))
    ));
  }

  #[test]
  fn minimal_json_deserialises_with_defaults() {
    let json = r#"{
      "id": "A1", "title": "Piso", "url": "https://example.com/1",
      "price": 250000, "district": "Retiro", "neighborhood": "Ibiza",
      "seller_kind": "individual"
    }"#;
    let rec: SnapshotRecord = serde_json::from_str(json).unwrap();
    assert_eq!(rec.orientation, Orientation::Unknown);
    assert_eq!(rec.rooms, None);
    assert!(!rec.is_new_development);
  }
}
