//! The `GraphStore` trait — the storage contract.
//!
//! The trait is implemented by storage backends (`mnemo-store-sqlite`,
//! `mnemo-store-json`). Higher layers (`mnemo-graph`, `mnemo-migrate`) depend
//! on this abstraction, not on any concrete backend.

use std::future::Future;

use crate::{
  entity::{Entity, ObservationAdditions, ObservationBatch, ObservationDeletion},
  graph::{KnowledgeGraph, StoreStats},
  relation::Relation,
};

/// Abstraction over a mnemo storage backend.
///
/// Duplicate writes and writes referencing missing entities are silent
/// no-ops: callers detect them by inspecting the returned created/added
/// subset, never through an error.
///
/// Multi-item operations are batch-atomic where the backend is transactional;
/// over a flat-file backend atomicity is best-effort.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait GraphStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Prepare the backend (schema creation, file existence). Idempotent.
  fn initialize(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert entities, skipping names that already exist. Returns only the
  /// subset actually created; observations of pre-existing entities are
  /// untouched.
  fn create_entities(
    &self,
    entities: Vec<Entity>,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + '_;

  /// Insert relations, skipping duplicate triples and triples referencing a
  /// missing endpoint. Returns only the subset actually created.
  fn create_relations(
    &self,
    relations: Vec<Relation>,
  ) -> impl Future<Output = Result<Vec<Relation>, Self::Error>> + Send + '_;

  /// Add observations to existing entities. Content already present on the
  /// entity (or repeated within the batch) is dropped; unknown entity names
  /// are skipped and absent from the result.
  fn add_observations(
    &self,
    batch: Vec<ObservationBatch>,
  ) -> impl Future<Output = Result<Vec<ObservationAdditions>, Self::Error>> + Send + '_;

  /// Delete entities by name, cascading to their observations and to every
  /// relation touching them.
  fn delete_entities(
    &self,
    names: Vec<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete exact observation contents from entities. Missing content is a
  /// no-op.
  fn delete_observations(
    &self,
    batch: Vec<ObservationDeletion>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete exact relation triples. Missing triples are a no-op.
  fn delete_relations(
    &self,
    relations: Vec<Relation>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Fetch entities by name, with their observations. Unknown names are
  /// simply absent from the result.
  fn get_entities<'a>(
    &'a self,
    names: &'a [String],
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + 'a;

  /// Fetch relations. An empty `names` slice means all relations; a
  /// non-empty slice means any relation touching at least one named entity
  /// (OR semantics — callers wanting both endpoints resident filter
  /// themselves).
  fn get_relations<'a>(
    &'a self,
    names: &'a [String],
  ) -> impl Future<Output = Result<Vec<Relation>, Self::Error>> + Send + 'a;

  /// Full-text search over entity names, types, and observation content.
  /// Returns at most 100 distinct entities.
  fn search_entities<'a>(
    &'a self,
    query: &'a str,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + 'a;

  /// Read the whole graph as one snapshot.
  fn load_graph(
    &self,
  ) -> impl Future<Output = Result<KnowledgeGraph, Self::Error>> + Send + '_;

  /// Destructively replace the whole graph. Relations whose endpoints are
  /// not part of the supplied entity list are silently dropped; per-entity
  /// observations are deduplicated.
  fn save_graph(
    &self,
    graph: KnowledgeGraph,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Introspection / lifecycle ─────────────────────────────────────────

  /// Row counts plus on-disk size where the backend can compute one.
  fn get_stats(
    &self,
  ) -> impl Future<Output = Result<StoreStats, Self::Error>> + Send + '_;

  /// Release handles and stop background tasks. The store must not be used
  /// afterwards.
  fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
