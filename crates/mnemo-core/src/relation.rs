//! Relation — a typed directed edge between two entities.

use serde::{Deserialize, Serialize};

/// A directed edge `from → to` carrying a free-text type label.
///
/// The `(from, to, relationType)` triple is unique; re-inserting an identical
/// triple is a no-op. Both endpoints must name existing entities — an insert
/// referencing a missing endpoint affects zero rows rather than erroring.
/// Self-loops (`from == to`) and cycles are permitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
  pub from:          String,
  pub to:            String,
  pub relation_type: String,
}
