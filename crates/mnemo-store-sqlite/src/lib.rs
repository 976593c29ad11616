//! SQLite backend for the mnemo knowledge graph store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on dedicated worker
//! threads without blocking the async runtime. A bounded
//! [`pool::ConnectionPool`] arbitrates access to the single database file,
//! and a per-store [`cache::QueryCache`] short-circuits repeated reads.

mod schema;
mod store;

pub mod cache;
pub mod error;
pub mod pool;

pub use cache::CacheConfig;
pub use error::{Error, Result};
pub use pool::PoolConfig;
pub use store::{SqliteStore, StoreOptions};

#[cfg(test)]
mod tests;
