//! Graph orchestrator for the mnemo knowledge graph.
//!
//! Translates the nine logical graph operations into calls on any
//! [`GraphStore`]. The one non-trivial rule lives here: for `search_nodes`
//! and `open_nodes`, the storage layer fetches relations with cheap OR
//! semantics (any relation touching a fetched entity) and this layer
//! re-filters to AND semantics (both endpoints resident) before returning.
//! Pushing the AND filter down would complicate the indexed fetch for no
//! gain; the in-memory filter is exact and cheap.

use std::collections::HashSet;

use mnemo_core::{
  Entity, GraphStore, KnowledgeGraph, ObservationAdditions, ObservationBatch,
  ObservationDeletion, Relation,
};

#[cfg(test)]
mod tests;

/// The nine graph operations over a storage backend.
pub struct GraphService<S> {
  store: S,
}

impl<S: GraphStore> GraphService<S> {
  pub fn new(store: S) -> Self { Self { store } }

  /// The underlying store, for lifecycle calls (`get_stats`, `close`).
  pub fn store(&self) -> &S { &self.store }

  // ── Writes — straight delegation ──────────────────────────────────────────

  pub async fn create_entities(
    &self,
    entities: Vec<Entity>,
  ) -> Result<Vec<Entity>, S::Error> {
    self.store.create_entities(entities).await
  }

  pub async fn create_relations(
    &self,
    relations: Vec<Relation>,
  ) -> Result<Vec<Relation>, S::Error> {
    self.store.create_relations(relations).await
  }

  pub async fn add_observations(
    &self,
    batch: Vec<ObservationBatch>,
  ) -> Result<Vec<ObservationAdditions>, S::Error> {
    self.store.add_observations(batch).await
  }

  pub async fn delete_entities(&self, names: Vec<String>) -> Result<(), S::Error> {
    self.store.delete_entities(names).await
  }

  pub async fn delete_observations(
    &self,
    batch: Vec<ObservationDeletion>,
  ) -> Result<(), S::Error> {
    self.store.delete_observations(batch).await
  }

  pub async fn delete_relations(
    &self,
    relations: Vec<Relation>,
  ) -> Result<(), S::Error> {
    self.store.delete_relations(relations).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn read_graph(&self) -> Result<KnowledgeGraph, S::Error> {
    self.store.load_graph().await
  }

  /// Full-text search, returning the matched entities plus the relations
  /// connecting them to each other.
  pub async fn search_nodes(&self, query: &str) -> Result<KnowledgeGraph, S::Error> {
    let entities = self.store.search_entities(query).await?;
    self.with_connecting_relations(entities).await
  }

  /// Fetch entities by name, plus the relations connecting them to each
  /// other. Unknown names are simply absent.
  pub async fn open_nodes(&self, names: &[String]) -> Result<KnowledgeGraph, S::Error> {
    let entities = self.store.get_entities(names).await?;
    self.with_connecting_relations(entities).await
  }

  async fn with_connecting_relations(
    &self,
    entities: Vec<Entity>,
  ) -> Result<KnowledgeGraph, S::Error> {
    let names: Vec<String> = entities.iter().map(|e| e.name.clone()).collect();
    let relations = if names.is_empty() {
      Vec::new()
    } else {
      let fetched = self.store.get_relations(&names).await?;
      let resident: HashSet<&str> = entities.iter().map(|e| e.name.as_str()).collect();
      fetched
        .into_iter()
        .filter(|r| resident.contains(r.from.as_str()) && resident.contains(r.to.as_str()))
        .collect()
    };
    Ok(KnowledgeGraph { entities, relations })
  }
}
