//! Line-delimited flat-file backend for the mnemo knowledge graph.
//!
//! One JSON record per line, tagged `"type": "entity"` or
//! `"type": "relation"`. Every operation is a load-modify-save over the whole
//! file, so atomicity is best-effort — this backend is the migration source
//! and a contract reference, not the engine of record.

pub mod error;

use std::{
  collections::HashSet,
  io::ErrorKind,
  path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use mnemo_core::{
  Entity, GraphStore, KnowledgeGraph, ObservationAdditions, ObservationBatch,
  ObservationDeletion, Relation, StoreStats,
};

pub use error::{Error, Result};


/// One line of the file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Record {
  Entity(Entity),
  Relation(Relation),
}

/// A knowledge graph store backed by a line-delimited JSON file.
///
/// A missing file reads as an empty graph; the file is created on first
/// write.
pub struct JsonStore {
  path: PathBuf,
  /// Serialises the load-modify-save cycles of concurrent operations.
  lock: Mutex<()>,
}

impl JsonStore {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self { path: path.as_ref().to_path_buf(), lock: Mutex::new(()) }
  }

  pub fn path(&self) -> &Path { &self.path }

  async fn load(&self) -> Result<KnowledgeGraph> {
    let text = match tokio::fs::read_to_string(&self.path).await {
      Ok(text) => text,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(KnowledgeGraph::default()),
      Err(e) => return Err(e.into()),
    };

    let mut graph = KnowledgeGraph::default();
    for (index, line) in text.lines().enumerate() {
      if line.trim().is_empty() {
        continue;
      }
      let record: Record = serde_json::from_str(line)
        .map_err(|source| Error::Malformed { line: index + 1, source })?;
      match record {
        Record::Entity(entity) => graph.entities.push(entity),
        Record::Relation(relation) => graph.relations.push(relation),
      }
    }
    Ok(graph)
  }

  async fn save(&self, graph: &KnowledgeGraph) -> Result<()> {
    let mut lines = Vec::with_capacity(graph.entities.len() + graph.relations.len());
    for entity in &graph.entities {
      lines.push(
        serde_json::to_string(&Record::Entity(entity.clone()))
          .map_err(Error::Serialization)?,
      );
    }
    for relation in &graph.relations {
      lines.push(
        serde_json::to_string(&Record::Relation(relation.clone()))
          .map_err(Error::Serialization)?,
      );
    }
    tokio::fs::write(&self.path, lines.join("\n")).await?;
    Ok(())
  }
}

/// Clean a graph in place the way the contract requires on bulk writes:
/// per-entity observation dedup and dropping relations with missing
/// endpoints.
fn clean(graph: &mut KnowledgeGraph) {
  for entity in &mut graph.entities {
    let mut seen = HashSet::new();
    entity.observations.retain(|content| seen.insert(content.clone()));
  }
  let names: HashSet<&str> = graph.entities.iter().map(|e| e.name.as_str()).collect();
  graph
    .relations
    .retain(|r| names.contains(r.from.as_str()) && names.contains(r.to.as_str()));
}

impl GraphStore for JsonStore {
  type Error = Error;

  async fn initialize(&self) -> Result<()> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn create_entities(&self, entities: Vec<Entity>) -> Result<Vec<Entity>> {
    let _guard = self.lock.lock().await;
    let mut graph = self.load().await?;

    let mut names: HashSet<String> =
      graph.entities.iter().map(|e| e.name.clone()).collect();
    let mut created = Vec::new();
    for mut entity in entities {
      if !names.insert(entity.name.clone()) {
        continue;
      }
      let mut seen = HashSet::new();
      entity.observations.retain(|content| seen.insert(content.clone()));
      graph.entities.push(entity.clone());
      created.push(entity);
    }

    if !created.is_empty() {
      self.save(&graph).await?;
    }
    Ok(created)
  }

  async fn create_relations(&self, relations: Vec<Relation>) -> Result<Vec<Relation>> {
    let _guard = self.lock.lock().await;
    let mut graph = self.load().await?;

    let names: HashSet<&str> =
      graph.entities.iter().map(|e| e.name.as_str()).collect();
    let existing: HashSet<Relation> = graph.relations.iter().cloned().collect();

    let mut created = Vec::new();
    for relation in relations {
      if !names.contains(relation.from.as_str())
        || !names.contains(relation.to.as_str())
        || existing.contains(&relation)
        || created.contains(&relation)
      {
        continue;
      }
      created.push(relation);
    }

    if !created.is_empty() {
      graph.relations.extend(created.iter().cloned());
      self.save(&graph).await?;
    }
    Ok(created)
  }

  async fn add_observations(
    &self,
    batch: Vec<ObservationBatch>,
  ) -> Result<Vec<ObservationAdditions>> {
    let _guard = self.lock.lock().await;
    let mut graph = self.load().await?;

    let mut results = Vec::new();
    for item in batch {
      let Some(entity) =
        graph.entities.iter_mut().find(|e| e.name == item.entity_name)
      else {
        continue;
      };
      let mut added = Vec::new();
      for content in item.contents {
        if !entity.observations.contains(&content) {
          entity.observations.push(content.clone());
          added.push(content);
        }
      }
      results.push(ObservationAdditions {
        entity_name:        item.entity_name,
        added_observations: added,
      });
    }

    if !results.is_empty() {
      self.save(&graph).await?;
    }
    Ok(results)
  }

  async fn delete_entities(&self, names: Vec<String>) -> Result<()> {
    let _guard = self.lock.lock().await;
    let mut graph = self.load().await?;

    let doomed: HashSet<&str> = names.iter().map(String::as_str).collect();
    graph.entities.retain(|e| !doomed.contains(e.name.as_str()));
    graph
      .relations
      .retain(|r| !doomed.contains(r.from.as_str()) && !doomed.contains(r.to.as_str()));

    self.save(&graph).await
  }

  async fn delete_observations(&self, batch: Vec<ObservationDeletion>) -> Result<()> {
    let _guard = self.lock.lock().await;
    let mut graph = self.load().await?;

    for item in &batch {
      if let Some(entity) =
        graph.entities.iter_mut().find(|e| e.name == item.entity_name)
      {
        entity.observations.retain(|content| !item.observations.contains(content));
      }
    }

    self.save(&graph).await
  }

  async fn delete_relations(&self, relations: Vec<Relation>) -> Result<()> {
    let _guard = self.lock.lock().await;
    let mut graph = self.load().await?;

    graph.relations.retain(|r| !relations.contains(r));
    self.save(&graph).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_entities(&self, names: &[String]) -> Result<Vec<Entity>> {
    let _guard = self.lock.lock().await;
    let graph = self.load().await?;

    let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
    Ok(
      graph
        .entities
        .into_iter()
        .filter(|e| wanted.contains(e.name.as_str()))
        .collect(),
    )
  }

  async fn get_relations(&self, names: &[String]) -> Result<Vec<Relation>> {
    let _guard = self.lock.lock().await;
    let graph = self.load().await?;

    if names.is_empty() {
      return Ok(graph.relations);
    }
    let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
    Ok(
      graph
        .relations
        .into_iter()
        .filter(|r| wanted.contains(r.from.as_str()) || wanted.contains(r.to.as_str()))
        .collect(),
    )
  }

  async fn search_entities(&self, query: &str) -> Result<Vec<Entity>> {
    let _guard = self.lock.lock().await;
    let graph = self.load().await?;

    let needle = query.to_lowercase();
    Ok(
      graph
        .entities
        .into_iter()
        .filter(|e| {
          e.name.to_lowercase().contains(&needle)
            || e.entity_type.to_lowercase().contains(&needle)
            || e.observations.iter().any(|o| o.to_lowercase().contains(&needle))
        })
        .collect(),
    )
  }

  async fn load_graph(&self) -> Result<KnowledgeGraph> {
    let _guard = self.lock.lock().await;
    self.load().await
  }

  async fn save_graph(&self, graph: KnowledgeGraph) -> Result<()> {
    let _guard = self.lock.lock().await;
    let mut graph = graph;
    clean(&mut graph);
    self.save(&graph).await
  }

  // ── Introspection / lifecycle ─────────────────────────────────────────────

  async fn get_stats(&self) -> Result<StoreStats> {
    let _guard = self.lock.lock().await;
    let graph = self.load().await?;

    let storage_size = match tokio::fs::metadata(&self.path).await {
      Ok(meta) => Some(meta.len()),
      Err(e) if e.kind() == ErrorKind::NotFound => Some(0),
      Err(e) => return Err(e.into()),
    };

    Ok(StoreStats {
      entity_count:      graph.entities.len() as u64,
      relation_count:    graph.relations.len() as u64,
      observation_count: graph
        .entities
        .iter()
        .map(|e| e.observations.len() as u64)
        .sum(),
      storage_size,
    })
  }

  async fn close(&self) -> Result<()> { Ok(()) }
}
