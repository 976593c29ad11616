//! Error type for `mnemo-store-json`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(serde_json::Error),

  /// A line in the file did not parse as an entity or relation record.
  #[error("malformed record on line {line}: {source}")]
  Malformed {
    line:   usize,
    source: serde_json::Error,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
