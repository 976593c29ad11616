//! Integration tests for `SqliteStore` against an on-disk database in a
//! temporary directory.

use std::{sync::Arc, time::Duration};

use mnemo_core::{
  Entity, GraphStore, KnowledgeGraph, ObservationBatch, ObservationDeletion, Relation,
};
use tempfile::TempDir;

use crate::{
  CacheConfig, PoolConfig, SqliteStore, StoreOptions,
  cache::{CachedValue, QueryCache, QueryKind},
  pool::ConnectionPool,
};

async fn store() -> (TempDir, SqliteStore) {
  let dir = tempfile::tempdir().expect("temp dir");
  let store = SqliteStore::open(dir.path().join("graph.db"), StoreOptions::default())
    .await
    .expect("open store");
  (dir, store)
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

// ─── Entities ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_entities() {
  let (_dir, s) = store().await;

  let created = s
    .create_entities(vec![
      entity("alice", "person", &["likes tea"]),
      entity("bob", "person", &[]),
    ])
    .await
    .unwrap();
  assert_eq!(created.len(), 2);

  let fetched = s.get_entities(&["alice".into()]).await.unwrap();
  assert_eq!(fetched.len(), 1);
  assert_eq!(fetched[0].name, "alice");
  assert_eq!(fetched[0].entity_type, "person");
  assert_eq!(fetched[0].observations, vec!["likes tea"]);
}

#[tokio::test]
async fn create_entities_skips_existing() {
  let (_dir, s) = store().await;

  s.create_entities(vec![entity("alice", "person", &["original"])])
    .await
    .unwrap();

  // Second create under the same name is a no-op: nothing reported created,
  // the stored observations untouched.
  let created = s
    .create_entities(vec![entity("alice", "robot", &["replacement"])])
    .await
    .unwrap();
  assert!(created.is_empty());

  let fetched = s.get_entities(&["alice".into()]).await.unwrap();
  assert_eq!(fetched[0].entity_type, "person");
  assert_eq!(fetched[0].observations, vec!["original"]);
}

#[tokio::test]
async fn create_entities_twice_is_idempotent() {
  let (_dir, s) = store().await;
  let batch = vec![
    entity("alice", "person", &["likes tea"]),
    entity("bob", "person", &["rides bikes"]),
  ];

  s.create_entities(batch.clone()).await.unwrap();
  let first = s.load_graph().await.unwrap();

  let second_created = s.create_entities(batch).await.unwrap();
  assert!(second_created.is_empty());

  let second = s.load_graph().await.unwrap();
  assert_eq!(first, second);
}

#[tokio::test]
async fn create_entities_dedups_observations() {
  let (_dir, s) = store().await;

  let created = s
    .create_entities(vec![entity("alice", "person", &["x", "x", "y"])])
    .await
    .unwrap();
  assert_eq!(created[0].observations, vec!["x", "y"]);

  let fetched = s.get_entities(&["alice".into()]).await.unwrap();
  assert_eq!(fetched[0].observations, vec!["x", "y"]);
}

#[tokio::test]
async fn delete_entities_cascades() {
  let (_dir, s) = store().await;

  s.create_entities(vec![
    entity("alice", "person", &["likes tea"]),
    entity("bob", "person", &[]),
  ])
  .await
  .unwrap();
  s.create_relations(vec![
    relation("alice", "bob", "knows"),
    relation("bob", "alice", "knows"),
  ])
  .await
  .unwrap();

  s.delete_entities(vec!["alice".into()]).await.unwrap();

  assert!(s.get_entities(&["alice".into()]).await.unwrap().is_empty());
  assert!(s.get_relations(&["alice".into()]).await.unwrap().is_empty());

  let graph = s.load_graph().await.unwrap();
  assert_eq!(graph.entities.len(), 1);
  assert_eq!(graph.entities[0].name, "bob");
  assert!(graph.relations.is_empty());

  // The cascade also removed alice's observations.
  let stats = s.get_stats().await.unwrap();
  assert_eq!(stats.observation_count, 0);
}

// ─── Relations ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_relations_skips_dangling_endpoints() {
  let (_dir, s) = store().await;

  s.create_entities(vec![entity("alice", "person", &[]), entity("bob", "person", &[])])
    .await
    .unwrap();

  let created = s
    .create_relations(vec![
      relation("alice", "bob", "knows"),
      relation("alice", "carol", "knows"), // carol does not exist
    ])
    .await
    .unwrap();
  assert_eq!(created, vec![relation("alice", "bob", "knows")]);

  // Creating the missing endpoint afterwards does not resurrect the triple.
  s.create_entities(vec![entity("carol", "person", &[])]).await.unwrap();
  let graph = s.load_graph().await.unwrap();
  assert_eq!(graph.relations, vec![relation("alice", "bob", "knows")]);
}

#[tokio::test]
async fn create_relations_skips_duplicates() {
  let (_dir, s) = store().await;

  s.create_entities(vec![entity("alice", "person", &[]), entity("bob", "person", &[])])
    .await
    .unwrap();

  let first = s
    .create_relations(vec![relation("alice", "bob", "knows")])
    .await
    .unwrap();
  assert_eq!(first.len(), 1);

  let second = s
    .create_relations(vec![relation("alice", "bob", "knows")])
    .await
    .unwrap();
  assert!(second.is_empty());

  assert_eq!(s.get_relations(&[]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn relations_allow_self_loops() {
  let (_dir, s) = store().await;

  s.create_entities(vec![entity("ouroboros", "snake", &[])]).await.unwrap();
  let created = s
    .create_relations(vec![relation("ouroboros", "ouroboros", "eats")])
    .await
    .unwrap();
  assert_eq!(created.len(), 1);
}

#[tokio::test]
async fn get_relations_uses_or_semantics() {
  let (_dir, s) = store().await;

  s.create_entities(vec![
    entity("a", "node", &[]),
    entity("b", "node", &[]),
    entity("c", "node", &[]),
  ])
  .await
  .unwrap();
  s.create_relations(vec![
    relation("a", "b", "edge"),
    relation("b", "c", "edge"),
    relation("c", "a", "edge"),
  ])
  .await
  .unwrap();

  // Any relation touching "a", from either side.
  let touching_a = s.get_relations(&["a".into()]).await.unwrap();
  assert_eq!(
    touching_a,
    vec![relation("a", "b", "edge"), relation("c", "a", "edge")]
  );

  // Empty slice means all relations.
  assert_eq!(s.get_relations(&[]).await.unwrap().len(), 3);
}

#[tokio::test]
async fn delete_relations_removes_exact_triple() {
  let (_dir, s) = store().await;

  s.create_entities(vec![entity("a", "node", &[]), entity("b", "node", &[])])
    .await
    .unwrap();
  s.create_relations(vec![relation("a", "b", "likes"), relation("a", "b", "knows")])
    .await
    .unwrap();

  s.delete_relations(vec![relation("a", "b", "likes")]).await.unwrap();

  assert_eq!(s.get_relations(&[]).await.unwrap(), vec![relation("a", "b", "knows")]);
}

// ─── Observations ────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_observations_dedups_and_skips_unknown() {
  let (_dir, s) = store().await;

  s.create_entities(vec![entity("alice", "person", &["x"])]).await.unwrap();

  let results = s
    .add_observations(vec![
      ObservationBatch {
        entity_name: "alice".into(),
        contents:    vec!["x".into(), "y".into(), "y".into()],
      },
      ObservationBatch {
        entity_name: "nobody".into(),
        contents:    vec!["z".into()],
      },
    ])
    .await
    .unwrap();

  // The unknown entity is absent from the result entirely.
  assert_eq!(results.len(), 1);
  assert_eq!(results[0].entity_name, "alice");
  assert_eq!(results[0].added_observations, vec!["y"]);

  let fetched = s.get_entities(&["alice".into()]).await.unwrap();
  assert_eq!(fetched[0].observations, vec!["x", "y"]);
}

#[tokio::test]
async fn delete_observations_removes_content() {
  let (_dir, s) = store().await;

  s.create_entities(vec![entity("alice", "person", &["x", "y"])]).await.unwrap();

  s.delete_observations(vec![ObservationDeletion {
    entity_name:  "alice".into(),
    observations: vec!["x".into(), "not there".into()],
  }])
  .await
  .unwrap();

  let fetched = s.get_entities(&["alice".into()]).await.unwrap();
  assert_eq!(fetched[0].observations, vec!["y"]);
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_matches_name_type_and_observations() {
  let (_dir, s) = store().await;

  s.create_entities(vec![
    entity("alice", "person", &["prefers dark roast coffee"]),
    entity("workshop", "location", &["has a lathe"]),
  ])
  .await
  .unwrap();

  let by_name = s.search_entities("alice").await.unwrap();
  assert_eq!(by_name.len(), 1);
  assert_eq!(by_name[0].name, "alice");

  let by_type = s.search_entities("location").await.unwrap();
  assert_eq!(by_type.len(), 1);
  assert_eq!(by_type[0].name, "workshop");

  let by_observation = s.search_entities("coffee").await.unwrap();
  assert_eq!(by_observation.len(), 1);
  assert_eq!(by_observation[0].name, "alice");
  assert_eq!(by_observation[0].observations, vec!["prefers dark roast coffee"]);
}

#[tokio::test]
async fn search_matches_prefixes() {
  let (_dir, s) = store().await;

  s.create_entities(vec![entity("refactoring-notes", "document", &[])])
    .await
    .unwrap();

  let results = s.search_entities("refactor").await.unwrap();
  assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn search_reflects_mutations_despite_caching() {
  let (_dir, s) = store().await;

  // Prime the search cache with a miss.
  assert!(s.search_entities("gadget").await.unwrap().is_empty());

  s.create_entities(vec![entity("gadget", "device", &[])]).await.unwrap();
  let after_create = s.search_entities("gadget").await.unwrap();
  assert_eq!(after_create.len(), 1);

  s.delete_entities(vec!["gadget".into()]).await.unwrap();
  assert!(s.search_entities("gadget").await.unwrap().is_empty());
}

// ─── Whole graph ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn save_and_load_round_trip_cleans_input() {
  let (_dir, s) = store().await;

  let graph = KnowledgeGraph {
    entities:  vec![
      entity("a", "node", &["x", "x", "y"]),
      entity("b", "node", &[]),
    ],
    relations: vec![
      relation("a", "b", "edge"),
      relation("a", "ghost", "edge"), // endpoint not in the entity list
    ],
  };
  s.save_graph(graph).await.unwrap();

  let loaded = s.load_graph().await.unwrap();
  assert_eq!(loaded.entities.len(), 2);
  assert_eq!(loaded.entities[0].observations, vec!["x", "y"]);
  assert_eq!(loaded.relations, vec![relation("a", "b", "edge")]);
}

#[tokio::test]
async fn save_graph_replaces_previous_contents() {
  let (_dir, s) = store().await;

  s.create_entities(vec![entity("old", "node", &["stale"])]).await.unwrap();

  s.save_graph(KnowledgeGraph {
    entities:  vec![entity("new", "node", &[])],
    relations: vec![],
  })
  .await
  .unwrap();

  let loaded = s.load_graph().await.unwrap();
  assert_eq!(loaded.entities.len(), 1);
  assert_eq!(loaded.entities[0].name, "new");
}

#[tokio::test]
async fn load_graph_on_empty_store() {
  let (_dir, s) = store().await;
  assert_eq!(s.load_graph().await.unwrap(), KnowledgeGraph::default());
}

// ─── Stats ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_report_counts_and_size() {
  let (_dir, s) = store().await;

  s.create_entities(vec![
    entity("a", "node", &["one", "two"]),
    entity("b", "node", &["three"]),
  ])
  .await
  .unwrap();
  s.create_relations(vec![relation("a", "b", "edge")]).await.unwrap();

  let stats = s.get_stats().await.unwrap();
  assert_eq!(stats.entity_count, 2);
  assert_eq!(stats.relation_count, 1);
  assert_eq!(stats.observation_count, 3);
  assert!(stats.storage_size.unwrap() > 0);
}

// ─── Pool ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pool_waiters_proceed_as_holders_release() {
  let dir = tempfile::tempdir().expect("temp dir");
  let pool = ConnectionPool::new(dir.path().join("pool.db"), PoolConfig {
    max_connections: 2,
    ..PoolConfig::default()
  });

  let first = pool.acquire().await.unwrap();
  let second = pool.acquire().await.unwrap();

  // The third acquisition must park until a holder releases.
  let third = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
  assert!(third.is_err());

  drop(first);
  let third = tokio::time::timeout(Duration::from_secs(1), pool.acquire())
    .await
    .expect("woken by release")
    .unwrap();

  drop(second);
  drop(third);
  pool.close().await.unwrap();
}

#[tokio::test]
async fn contended_store_operations_all_complete() {
  let dir = tempfile::tempdir().expect("temp dir");
  let store = SqliteStore::open(dir.path().join("graph.db"), StoreOptions {
    pool: PoolConfig { max_connections: 2, ..PoolConfig::default() },
    ..StoreOptions::default()
  })
  .await
  .unwrap();
  let store = Arc::new(store);

  let mut tasks = tokio::task::JoinSet::new();
  for i in 0..16 {
    let store = Arc::clone(&store);
    tasks.spawn(async move {
      store
        .create_entities(vec![entity(&format!("entity-{i}"), "node", &["obs"])])
        .await
        .unwrap();
    });
  }
  while let Some(result) = tasks.join_next().await {
    result.unwrap();
  }

  let stats = store.get_stats().await.unwrap();
  assert_eq!(stats.entity_count, 16);
}

#[tokio::test]
async fn close_fails_later_operations() {
  let (_dir, s) = store().await;

  s.close().await.unwrap();

  let err = s.create_entities(vec![entity("late", "node", &[])]).await;
  assert!(matches!(err, Err(crate::Error::PoolClosed)));
}

// ─── Cache ───────────────────────────────────────────────────────────────────

fn cached_entities(names: &[&str]) -> CachedValue {
  CachedValue::Entities(names.iter().map(|n| entity(n, "node", &[])).collect())
}

#[tokio::test]
async fn cache_expires_entries_after_ttl() {
  let cache = QueryCache::new(CacheConfig {
    ttl: Duration::from_millis(40),
    ..CacheConfig::default()
  });

  cache.put(
    QueryKind::Entities,
    "k".into(),
    cached_entities(&["a"]),
    ["a".to_string()].into(),
  );
  assert!(cache.get(QueryKind::Entities, "k").is_some());

  tokio::time::sleep(Duration::from_millis(60)).await;
  assert!(cache.get(QueryKind::Entities, "k").is_none());
  cache.stop();
}

#[tokio::test]
async fn cache_evicts_least_recently_used_when_full() {
  // Room for two entries of roughly a hundred bytes each, not three.
  let cache = QueryCache::new(CacheConfig {
    max_bytes: 250,
    ..CacheConfig::default()
  });

  cache.put(QueryKind::Entities, "first".into(), cached_entities(&["a"]), ["a".to_string()].into());
  cache.put(QueryKind::Entities, "second".into(), cached_entities(&["b"]), ["b".to_string()].into());

  // Touch "first" so "second" becomes the LRU victim.
  assert!(cache.get(QueryKind::Entities, "first").is_some());

  cache.put(QueryKind::Entities, "third".into(), cached_entities(&["c"]), ["c".to_string()].into());

  assert!(cache.get(QueryKind::Entities, "first").is_some());
  assert!(cache.get(QueryKind::Entities, "second").is_none());
  assert!(cache.get(QueryKind::Entities, "third").is_some());
  cache.stop();
}

#[tokio::test]
async fn cache_invalidates_by_tag_not_by_name_collision() {
  let cache = QueryCache::new(CacheConfig::default());

  cache.put(QueryKind::Entities, "q1".into(), cached_entities(&["alice"]), ["alice".to_string()].into());
  cache.put(QueryKind::Entities, "q2".into(), cached_entities(&["alice-2"]), ["alice-2".to_string()].into());

  // Invalidating "alice" must not take the unrelated "alice-2" entry with it,
  // even though the names overlap as substrings.
  cache.invalidate_entities(&["alice".to_string()]);

  assert!(cache.get(QueryKind::Entities, "q1").is_none());
  assert!(cache.get(QueryKind::Entities, "q2").is_some());
  cache.stop();
}

#[tokio::test]
async fn cache_entity_mutations_clear_search_and_graph_families() {
  let cache = QueryCache::new(CacheConfig::default());

  cache.put(QueryKind::Search, "query".into(), cached_entities(&["a"]), Default::default());
  cache.put(
    QueryKind::Graph,
    "*".into(),
    CachedValue::Graph(KnowledgeGraph::default()),
    Default::default(),
  );
  cache.put(QueryKind::Entities, "other".into(), cached_entities(&["b"]), ["b".to_string()].into());

  cache.invalidate_entities(&["unrelated".to_string()]);

  // Search and graph families cleared wholesale; the tagged entity entry
  // for an untouched name survives.
  assert!(cache.get(QueryKind::Search, "query").is_none());
  assert!(cache.get(QueryKind::Graph, "*").is_none());
  assert!(cache.get(QueryKind::Entities, "other").is_some());
  cache.stop();
}

#[tokio::test]
async fn cache_relation_mutations_clear_relation_and_graph_families() {
  let cache = QueryCache::new(CacheConfig::default());

  cache.put(
    QueryKind::Relations,
    "*".into(),
    CachedValue::Relations(vec![relation("a", "b", "edge")]),
    Default::default(),
  );
  cache.put(
    QueryKind::Graph,
    "*".into(),
    CachedValue::Graph(KnowledgeGraph::default()),
    Default::default(),
  );
  cache.put(QueryKind::Entities, "q".into(), cached_entities(&["a"]), ["a".to_string()].into());

  cache.invalidate_relations();

  assert!(cache.get(QueryKind::Relations, "*").is_none());
  assert!(cache.get(QueryKind::Graph, "*").is_none());
  assert!(cache.get(QueryKind::Entities, "q").is_some());
  assert_eq!(cache.entry_count(), 1);
  cache.stop();
}
