//! Error type for `mnemo-migrate`.
//!
//! Verification failures name the offending entity, observation, or count so
//! an operator can locate the integrity problem without re-running.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("source file not found: {0}")]
  SourceMissing(PathBuf),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("source store error: {0}")]
  Source(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("target store error: {0}")]
  Target(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("entity not found in target: {0}")]
  EntityMissing(String),

  #[error("observation lost for {entity}: {content:?}")]
  ObservationLost { entity: String, content: String },

  #[error("count mismatch after migration: expected {expected} {what}, found {found}")]
  CountMismatch {
    what:     &'static str,
    expected: u64,
    found:    u64,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
