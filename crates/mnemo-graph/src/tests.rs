//! Orchestrator tests against the SQLite backend.

use mnemo_core::{Entity, Relation};
use mnemo_store_sqlite::{SqliteStore, StoreOptions};
use tempfile::TempDir;

use crate::GraphService;

async fn service() -> (TempDir, GraphService<SqliteStore>) {
  let dir = tempfile::tempdir().expect("temp dir");
  let store = SqliteStore::open(dir.path().join("graph.db"), StoreOptions::default())
    .await
    .expect("open store");
  (dir, GraphService::new(store))
}

fn entity(name: &str, entity_type: &str, observations: &[&str]) -> Entity {
  Entity {
    name:         name.into(),
    entity_type:  entity_type.into(),
    observations: observations.iter().map(|o| o.to_string()).collect(),
  }
}

fn relation(from: &str, to: &str, relation_type: &str) -> Relation {
  Relation {
    from:          from.into(),
    to:            to.into(),
    relation_type: relation_type.into(),
  }
}

async fn seed_triangle(svc: &GraphService<SqliteStore>) {
  svc
    .create_entities(vec![
      entity("compiler", "project", &["written in rust"]),
      entity("parser", "component", &["part of the compiler"]),
      entity("archive", "storage", &["cold data"]),
    ])
    .await
    .unwrap();
  svc
    .create_relations(vec![
      relation("compiler", "parser", "contains"),
      relation("parser", "archive", "writes-to"),
    ])
    .await
    .unwrap();
}

#[tokio::test]
async fn open_nodes_keeps_only_fully_resident_relations() {
  let (_dir, svc) = service().await;
  seed_triangle(&svc).await;

  let view = svc
    .open_nodes(&["compiler".into(), "parser".into()])
    .await
    .unwrap();

  assert_eq!(view.entities.len(), 2);
  // parser → archive touches a fetched entity, but archive is outside the
  // returned set, so it must not appear.
  assert_eq!(view.relations, vec![relation("compiler", "parser", "contains")]);
}

#[tokio::test]
async fn search_nodes_keeps_only_fully_resident_relations() {
  let (_dir, svc) = service().await;
  seed_triangle(&svc).await;

  // "compiler" matches both the compiler entity (by name) and the parser
  // entity (by observation content), but not the archive.
  let view = svc.search_nodes("compiler").await.unwrap();

  let mut names: Vec<&str> = view.entities.iter().map(|e| e.name.as_str()).collect();
  names.sort_unstable();
  assert_eq!(names, ["compiler", "parser"]);
  assert_eq!(view.relations, vec![relation("compiler", "parser", "contains")]);
}

#[tokio::test]
async fn open_nodes_with_no_matches_returns_empty_view() {
  let (_dir, svc) = service().await;
  seed_triangle(&svc).await;

  let view = svc.open_nodes(&["nothing".into()]).await.unwrap();
  assert!(view.entities.is_empty());
  assert!(view.relations.is_empty());
}

#[tokio::test]
async fn read_graph_returns_everything() {
  let (_dir, svc) = service().await;
  seed_triangle(&svc).await;

  let graph = svc.read_graph().await.unwrap();
  assert_eq!(graph.entities.len(), 3);
  assert_eq!(graph.relations.len(), 2);
}

#[tokio::test]
async fn delete_operations_round_trip() {
  let (_dir, svc) = service().await;
  seed_triangle(&svc).await;

  svc.delete_relations(vec![relation("compiler", "parser", "contains")])
    .await
    .unwrap();
  svc.delete_entities(vec!["archive".into()]).await.unwrap();

  let graph = svc.read_graph().await.unwrap();
  assert_eq!(graph.entities.len(), 2);
  assert!(graph.relations.is_empty());
}
