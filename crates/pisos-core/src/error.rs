//! Error types for `pisos-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("snapshot record has an empty id")]
  EmptyId,

  #[error("listing {0:?} has a negative price: {1}")]
  NegativePrice(String, i64),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
