//! Entity — a named, typed node owning free-text observations.
//!
//! The entity name is the primary key of the whole graph: relations reference
//! entities by name, and every batch operation is keyed on it.

use serde::{Deserialize, Serialize};

/// A node in the knowledge graph.
///
/// Names are unique across the graph. Creating an entity whose name already
/// exists is a no-op that leaves the existing entity and its observations
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
  pub name:         String,
  pub entity_type:  String,
  /// Free-text observations. Content is unique within one entity; duplicates
  /// are silently dropped on write.
  #[serde(default)]
  pub observations: Vec<String>,
}

// ─── Observation batch records ───────────────────────────────────────────────

/// Input record for an add-observations call: new contents for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationBatch {
  pub entity_name: String,
  pub contents:    Vec<String>,
}

/// Result record for an add-observations call: the subset actually inserted
/// for one entity, after deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationAdditions {
  pub entity_name:        String,
  pub added_observations: Vec<String>,
}

/// Input record for a delete-observations call: exact contents to remove from
/// one entity. Content that is not present is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationDeletion {
  pub entity_name:  String,
  pub observations: Vec<String>,
}
