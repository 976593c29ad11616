//! Error type for `mnemo-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// The pool was closed while the caller was waiting for a handle, or the
  /// store was used after `close()`.
  #[error("connection pool is closed")]
  PoolClosed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
