//! mnemo-migrate binary.
//!
//! Moves a line-delimited flat-file knowledge graph into the SQLite engine:
//!
//! ```text
//! mnemo-migrate memory.jsonl graph.db --backup --verify
//! ```
//!
//! Store tuning (pool bound, idle timeout, cache budget, TTL) can be supplied
//! via a TOML file with `--config` or `MNEMO_*` environment variables.

use std::{path::PathBuf, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use mnemo_migrate::MigrateOptions;
use mnemo_store_sqlite::{CacheConfig, PoolConfig, StoreOptions};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Migrate a mnemo flat-file graph into SQLite")]
struct Cli {
  /// Path to the line-delimited JSON source file.
  source: PathBuf,

  /// Path to the SQLite database to create or fill.
  target: PathBuf,

  /// Copy the source file to a timestamped sibling before migrating.
  #[arg(long)]
  backup: bool,

  /// Re-read the target after migrating and fail on any discrepancy.
  #[arg(long)]
  verify: bool,

  /// Path to a TOML file with store tuning knobs.
  #[arg(short, long)]
  config: Option<PathBuf>,
}

/// Optional store tuning, all fields defaulted.
#[derive(Debug, Default, Deserialize)]
struct Tuning {
  pool_max_connections: Option<usize>,
  pool_idle_timeout_secs: Option<u64>,
  cache_max_bytes: Option<usize>,
  cache_ttl_secs: Option<u64>,
}

impl Tuning {
  fn into_store_options(self) -> StoreOptions {
    let mut pool = PoolConfig::default();
    if let Some(max) = self.pool_max_connections {
      pool.max_connections = max;
    }
    if let Some(secs) = self.pool_idle_timeout_secs {
      pool.idle_timeout = Duration::from_secs(secs);
    }

    let mut cache = CacheConfig::default();
    if let Some(bytes) = self.cache_max_bytes {
      cache.max_bytes = bytes;
    }
    if let Some(secs) = self.cache_ttl_secs {
      cache.ttl = Duration::from_secs(secs);
    }

    StoreOptions { pool, cache }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut settings = config::Config::builder();
  if let Some(path) = &cli.config {
    settings = settings.add_source(config::File::from(path.clone()));
  }
  let tuning: Tuning = settings
    .add_source(config::Environment::with_prefix("MNEMO").try_parsing(true))
    .build()
    .context("failed to read configuration")?
    .try_deserialize()
    .context("failed to deserialise store tuning")?;

  let options = MigrateOptions { backup: cli.backup, verify: cli.verify };
  let report = mnemo_migrate::migrate_file(
    &cli.source,
    &cli.target,
    options,
    tuning.into_store_options(),
  )
  .await
  .context("migration failed")?;

  println!(
    "Migrated {} entities, {} relations, {} observations",
    report.entity_count, report.relation_count, report.observation_count,
  );
  println!(
    "Repaired: {} duplicate observations removed, {} invalid relations skipped",
    report.duplicate_observations_removed, report.invalid_relations_skipped,
  );
  println!(
    "Size: {} -> {} bytes ({:.1}% reduction)",
    report.source_size,
    report.target_size,
    report.size_reduction_percent(),
  );

  Ok(())
}
