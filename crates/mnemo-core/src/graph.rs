//! Whole-graph snapshot and stats payload types.

use serde::{Deserialize, Serialize};

use crate::{entity::Entity, relation::Relation};

/// The full set of entities and relations, treated as a single consistent
/// snapshot by the bulk [`save_graph`](crate::store::GraphStore::save_graph)
/// and [`load_graph`](crate::store::GraphStore::load_graph) operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
  #[serde(default)]
  pub entities:  Vec<Entity>,
  #[serde(default)]
  pub relations: Vec<Relation>,
}

/// Row counts and on-disk size, consumed by health/monitoring collaborators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
  pub entity_count:      u64,
  pub relation_count:    u64,
  pub observation_count: u64,
  /// On-disk size in bytes, where the backend can compute one.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub storage_size:      Option<u64>,
}
