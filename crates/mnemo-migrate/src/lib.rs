//! Migration pipeline: flat-file knowledge graph → SQLite engine.
//!
//! Reads the complete graph from a source backend, repairs data-quality
//! defects (duplicate observations, relations with missing endpoints),
//! writes the cleaned graph into the target through its normal batch
//! transactions, and optionally backs up the source file and verifies the
//! result entity by entity.

pub mod error;

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
};

use tracing::{debug, info};

use mnemo_core::{Entity, GraphStore, Relation};
use mnemo_store_json::JsonStore;
use mnemo_store_sqlite::{SqliteStore, StoreOptions};

pub use error::{Error, Result};


/// Pipeline switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateOptions {
  /// Copy the source file to a timestamped sibling before any write.
  pub backup: bool,
  /// Re-read the target after writing and fail loudly on any discrepancy.
  pub verify: bool,
}

/// What the pipeline did, with enough numbers to audit it.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationReport {
  pub entity_count:                    u64,
  pub relation_count:                  u64,
  pub observation_count:               u64,
  pub duplicate_observations_removed:  u64,
  pub invalid_relations_skipped:       u64,
  /// Source size in bytes before migration.
  pub source_size:                     u64,
  /// Target size in bytes after migration.
  pub target_size:                     u64,
}

impl MigrationReport {
  /// Positive when the target is smaller than the source.
  pub fn size_reduction_percent(&self) -> f64 {
    if self.source_size == 0 {
      return 0.0;
    }
    (self.source_size as f64 - self.target_size as f64) / self.source_size as f64
      * 100.0
  }
}

fn source_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
  Error::Source(Box::new(e))
}

fn target_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
  Error::Target(Box::new(e))
}

/// Migrate a flat-file graph at `source_path` into a SQLite engine at
/// `target_path`. Both backends are closed before returning, on success and
/// on failure alike.
pub async fn migrate_file(
  source_path: impl AsRef<Path>,
  target_path: impl AsRef<Path>,
  options: MigrateOptions,
  store_options: StoreOptions,
) -> Result<MigrationReport> {
  let source_path = source_path.as_ref();

  if !tokio::fs::try_exists(source_path).await? {
    return Err(Error::SourceMissing(source_path.to_path_buf()));
  }

  if options.backup {
    let backup = backup_path(source_path);
    tokio::fs::copy(source_path, &backup).await?;
    info!(backup = %backup.display(), "backed up source file");
  }

  let source = JsonStore::new(source_path);
  let target = SqliteStore::open(target_path, store_options)
    .await
    .map_err(target_err)?;

  let result = migrate(&source, &target, options).await;

  // Close both backends whether or not the pipeline succeeded.
  let source_closed = source.close().await;
  let target_closed = target.close().await;

  let report = result?;
  source_closed.map_err(source_err)?;
  target_closed.map_err(target_err)?;
  Ok(report)
}

/// The backend-agnostic pipeline: read, clean, write, optionally verify.
///
/// The target is expected to be empty; a pre-populated target surfaces as a
/// verification failure, not silent merging.
pub async fn migrate<S, T>(
  source: &S,
  target: &T,
  options: MigrateOptions,
) -> Result<MigrationReport>
where
  S: GraphStore,
  T: GraphStore,
{
  let graph = source.load_graph().await.map_err(source_err)?;
  let source_stats = source.get_stats().await.map_err(source_err)?;
  info!(
    entities = source_stats.entity_count,
    relations = source_stats.relation_count,
    observations = source_stats.observation_count,
    "read source graph"
  );

  let (entities, duplicates_removed) = dedup_observations(graph.entities);
  let (relations, invalid_skipped) = drop_dangling(&entities, graph.relations);
  if duplicates_removed > 0 || invalid_skipped > 0 {
    info!(
      duplicates_removed,
      invalid_skipped, "repaired data-quality defects in source graph"
    );
  }

  target.initialize().await.map_err(target_err)?;
  target
    .create_entities(entities.clone())
    .await
    .map_err(target_err)?;
  target
    .create_relations(relations.clone())
    .await
    .map_err(target_err)?;
  debug!("wrote cleaned graph to target");

  if options.verify {
    // Expected counts are the source counts after accounting for the
    // repairs reported above.
    verify(target, &entities, relations.len() as u64).await?;
    info!("verification passed");
  }

  let target_stats = target.get_stats().await.map_err(target_err)?;

  Ok(MigrationReport {
    entity_count:                   entities.len() as u64,
    relation_count:                 relations.len() as u64,
    observation_count:              entities
      .iter()
      .map(|e| e.observations.len() as u64)
      .sum(),
    duplicate_observations_removed: duplicates_removed,
    invalid_relations_skipped:      invalid_skipped,
    source_size:                    source_stats.storage_size.unwrap_or(0),
    target_size:                    target_stats.storage_size.unwrap_or(0),
  })
}

/// Drop repeated observation content within each entity, counting removals.
fn dedup_observations(mut entities: Vec<Entity>) -> (Vec<Entity>, u64) {
  let mut removed = 0u64;
  for entity in &mut entities {
    let before = entity.observations.len();
    let mut seen = HashSet::new();
    entity.observations.retain(|content| seen.insert(content.clone()));
    removed += (before - entity.observations.len()) as u64;
  }
  (entities, removed)
}

/// Drop relations whose `from` or `to` entity is absent, counting skips.
fn drop_dangling(entities: &[Entity], relations: Vec<Relation>) -> (Vec<Relation>, u64) {
  let names: HashSet<&str> = entities.iter().map(|e| e.name.as_str()).collect();
  let before = relations.len();
  let kept: Vec<Relation> = relations
    .into_iter()
    .filter(|r| names.contains(r.from.as_str()) && names.contains(r.to.as_str()))
    .collect();
  let skipped = (before - kept.len()) as u64;
  (kept, skipped)
}

/// Compare target counts against the cleaned source, then spot-check that
/// every source entity is retrievable and every surviving observation is
/// present.
async fn verify<T: GraphStore>(
  target: &T,
  entities: &[Entity],
  expected_relations: u64,
) -> Result<()> {
  let stats = target.get_stats().await.map_err(target_err)?;

  let expected_entities = entities.len() as u64;
  if stats.entity_count != expected_entities {
    return Err(Error::CountMismatch {
      what:     "entities",
      expected: expected_entities,
      found:    stats.entity_count,
    });
  }
  if stats.relation_count != expected_relations {
    return Err(Error::CountMismatch {
      what:     "relations",
      expected: expected_relations,
      found:    stats.relation_count,
    });
  }
  let expected_observations: u64 =
    entities.iter().map(|e| e.observations.len() as u64).sum();
  if stats.observation_count != expected_observations {
    return Err(Error::CountMismatch {
      what:     "observations",
      expected: expected_observations,
      found:    stats.observation_count,
    });
  }

  for entity in entities {
    let fetched = target
      .get_entities(std::slice::from_ref(&entity.name))
      .await
      .map_err(target_err)?;
    let Some(found) = fetched.into_iter().next() else {
      return Err(Error::EntityMissing(entity.name.clone()));
    };
    let stored: HashSet<&str> =
      found.observations.iter().map(String::as_str).collect();
    for content in &entity.observations {
      if !stored.contains(content.as_str()) {
        return Err(Error::ObservationLost {
          entity:  entity.name.clone(),
          content: content.clone(),
        });
      }
    }
  }

  Ok(())
}

/// Timestamped sibling path for the pre-migration copy of `source`.
fn backup_path(source: &Path) -> PathBuf {
  let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
  let mut name = source
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "source".to_string());
  name.push_str(&format!(".backup-{stamp}"));
  source.with_file_name(name)
}
