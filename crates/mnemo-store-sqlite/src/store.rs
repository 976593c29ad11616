//! [`SqliteStore`] — the relational implementation of [`GraphStore`].
//!
//! Every write runs inside one transaction per call: either the whole batch
//! applies or the transaction rolls back. Reads go through the per-store
//! [`QueryCache`] and short-circuit on a hit.

use std::{
  collections::{HashMap, HashSet},
  path::Path,
};

use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tracing::debug;

use mnemo_core::{
  Entity, GraphStore, KnowledgeGraph, ObservationAdditions, ObservationBatch,
  ObservationDeletion, Relation, StoreStats,
};

use crate::{
  Error, Result,
  cache::{CacheConfig, CachedValue, QueryCache, QueryKind},
  pool::{ConnectionPool, PoolConfig},
  schema::SCHEMA,
};

/// Tuning for a [`SqliteStore`]: pool and cache knobs together.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
  pub pool:  PoolConfig,
  pub cache: CacheConfig,
}

/// A knowledge graph store backed by a single SQLite file.
///
/// The pool and cache are owned by the instance and live exactly as long as
/// it does; two stores never share state.
pub struct SqliteStore {
  pool:  ConnectionPool,
  cache: QueryCache,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
    let store = Self {
      pool:  ConnectionPool::new(path, options.pool),
      cache: QueryCache::new(options.cache),
    };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let conn = self.pool.acquire().await?;
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    debug!("database schema initialised");
    Ok(())
  }
}

// ─── GraphStore impl ─────────────────────────────────────────────────────────

impl GraphStore for SqliteStore {
  type Error = Error;

  async fn initialize(&self) -> Result<()> { self.init_schema().await }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn create_entities(&self, entities: Vec<Entity>) -> Result<Vec<Entity>> {
    let conn = self.pool.acquire().await?;

    let created: Vec<Entity> = conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut created = Vec::new();
        {
          let mut insert_entity = tx.prepare(
            "INSERT OR IGNORE INTO entities (name, entity_type) VALUES (?1, ?2)",
          )?;
          let mut insert_obs = tx
            .prepare("INSERT INTO observations (entity_id, content) VALUES (?1, ?2)")?;

          for entity in entities {
            let inserted = insert_entity
              .execute(rusqlite::params![entity.name, entity.entity_type])?;
            if inserted == 0 {
              // Name already taken: the existing entity and its observations
              // stay untouched.
              continue;
            }
            let id = tx.last_insert_rowid();

            let mut seen = HashSet::new();
            let mut observations = Vec::with_capacity(entity.observations.len());
            for content in &entity.observations {
              if seen.insert(content.as_str()) {
                insert_obs.execute(rusqlite::params![id, content])?;
                observations.push(content.clone());
              }
            }

            created.push(Entity {
              name: entity.name,
              entity_type: entity.entity_type,
              observations,
            });
          }
        }
        tx.commit()?;
        Ok(created)
      })
      .await?;

    if !created.is_empty() {
      let names: Vec<String> = created.iter().map(|e| e.name.clone()).collect();
      self.cache.invalidate_entities(&names);
    }
    Ok(created)
  }

  async fn create_relations(&self, relations: Vec<Relation>) -> Result<Vec<Relation>> {
    let conn = self.pool.acquire().await?;

    let created: Vec<Relation> = conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut created = Vec::new();
        {
          // The join resolves both endpoints in one pass: a triple naming a
          // missing entity matches zero rows and inserts nothing.
          let mut insert = tx.prepare(
            "INSERT OR IGNORE INTO relations (from_id, to_id, relation_type)
             SELECT f.id, t.id, ?3 FROM entities f, entities t
             WHERE f.name = ?1 AND t.name = ?2",
          )?;
          for relation in relations {
            let inserted = insert.execute(rusqlite::params![
              relation.from,
              relation.to,
              relation.relation_type,
            ])?;
            if inserted > 0 {
              created.push(relation);
            }
          }
        }
        tx.commit()?;
        Ok(created)
      })
      .await?;

    if !created.is_empty() {
      self.cache.invalidate_relations();
    }
    Ok(created)
  }

  async fn add_observations(
    &self,
    batch: Vec<ObservationBatch>,
  ) -> Result<Vec<ObservationAdditions>> {
    let conn = self.pool.acquire().await?;

    let results: Vec<ObservationAdditions> = conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut results = Vec::new();
        {
          let mut find_entity = tx.prepare("SELECT id FROM entities WHERE name = ?1")?;
          let mut exists = tx.prepare(
            "SELECT 1 FROM observations WHERE entity_id = ?1 AND content = ?2",
          )?;
          let mut insert = tx
            .prepare("INSERT INTO observations (entity_id, content) VALUES (?1, ?2)")?;

          for item in batch {
            let id: Option<i64> = find_entity
              .query_row(rusqlite::params![item.entity_name], |row| row.get(0))
              .optional()?;
            let Some(id) = id else {
              // Unknown entity: skipped, absent from the result.
              continue;
            };

            let mut added = Vec::new();
            for content in &item.contents {
              // The pre-existence check also catches repeats within the
              // batch, since earlier inserts are visible in the transaction.
              let present = exists
                .query_row(rusqlite::params![id, content], |_| Ok(()))
                .optional()?
                .is_some();
              if present {
                continue;
              }
              insert.execute(rusqlite::params![id, content])?;
              added.push(content.clone());
            }

            results.push(ObservationAdditions {
              entity_name:        item.entity_name,
              added_observations: added,
            });
          }
        }
        tx.commit()?;
        Ok(results)
      })
      .await?;

    if !results.is_empty() {
      let names: Vec<String> =
        results.iter().map(|r| r.entity_name.clone()).collect();
      self.cache.invalidate_entities(&names);
    }
    Ok(results)
  }

  async fn delete_entities(&self, names: Vec<String>) -> Result<()> {
    let conn = self.pool.acquire().await?;

    let batch = names.clone();
    conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
          // Observations and relations go with the entity via FK cascade.
          let mut delete = tx.prepare("DELETE FROM entities WHERE name = ?1")?;
          for name in &batch {
            delete.execute(rusqlite::params![name])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    self.cache.invalidate_entities(&names);
    // Cascade may have removed relations touching these entities.
    self.cache.invalidate_relations();
    Ok(())
  }

  async fn delete_observations(&self, batch: Vec<ObservationDeletion>) -> Result<()> {
    let conn = self.pool.acquire().await?;

    let names: Vec<String> = batch.iter().map(|d| d.entity_name.clone()).collect();
    conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
          let mut delete = tx.prepare(
            "DELETE FROM observations
             WHERE entity_id = (SELECT id FROM entities WHERE name = ?1)
               AND content = ?2",
          )?;
          for item in &batch {
            for content in &item.observations {
              delete.execute(rusqlite::params![item.entity_name, content])?;
            }
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    self.cache.invalidate_entities(&names);
    Ok(())
  }

  async fn delete_relations(&self, relations: Vec<Relation>) -> Result<()> {
    let conn = self.pool.acquire().await?;

    conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
          let mut delete = tx.prepare(
            "DELETE FROM relations
             WHERE from_id = (SELECT id FROM entities WHERE name = ?1)
               AND to_id = (SELECT id FROM entities WHERE name = ?2)
               AND relation_type = ?3",
          )?;
          for relation in &relations {
            delete.execute(rusqlite::params![
              relation.from,
              relation.to,
              relation.relation_type,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    self.cache.invalidate_relations();
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_entities(&self, names: &[String]) -> Result<Vec<Entity>> {
    if names.is_empty() {
      return Ok(Vec::new());
    }

    let key = names.join("\u{1f}");
    if let Some(CachedValue::Entities(hit)) = self.cache.get(QueryKind::Entities, &key)
    {
      return Ok(hit);
    }

    let conn = self.pool.acquire().await?;
    let owned = names.to_vec();
    let entities: Vec<Entity> = conn
      .call(move |conn| {
        let sql = format!(
          "SELECT id, name, entity_type FROM entities WHERE name IN ({}) ORDER BY id",
          placeholders(owned.len()),
        );
        let mut stmt = conn.prepare(&sql)?;
        let heads = stmt
          .query_map(rusqlite::params_from_iter(&owned), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut entities = Vec::with_capacity(heads.len());
        for (id, name, entity_type) in heads {
          entities.push(Entity {
            name,
            entity_type,
            observations: fetch_observations(conn, id)?,
          });
        }
        Ok(entities)
      })
      .await?;

    self.cache.put(
      QueryKind::Entities,
      key,
      CachedValue::Entities(entities.clone()),
      names.iter().cloned().collect(),
    );
    Ok(entities)
  }

  async fn get_relations(&self, names: &[String]) -> Result<Vec<Relation>> {
    let key = if names.is_empty() { "*".to_string() } else { names.join("\u{1f}") };
    if let Some(CachedValue::Relations(hit)) =
      self.cache.get(QueryKind::Relations, &key)
    {
      return Ok(hit);
    }

    let conn = self.pool.acquire().await?;
    let owned = names.to_vec();
    let relations: Vec<Relation> = conn
      .call(move |conn| {
        let relations = if owned.is_empty() {
          fetch_all_relations(conn)?
        } else {
          // OR semantics: any relation touching at least one named entity.
          // Callers wanting both endpoints resident filter themselves.
          let ph = placeholders(owned.len());
          let sql = format!(
            "SELECT f.name, t.name, r.relation_type
             FROM relations r
             JOIN entities f ON f.id = r.from_id
             JOIN entities t ON t.id = r.to_id
             WHERE f.name IN ({ph}) OR t.name IN ({ph})
             ORDER BY r.id",
          );
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(
              rusqlite::params_from_iter(owned.iter().chain(owned.iter())),
              row_to_relation,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(relations)
      })
      .await?;

    self.cache.put(
      QueryKind::Relations,
      key,
      CachedValue::Relations(relations.clone()),
      names.iter().cloned().collect(),
    );
    Ok(relations)
  }

  async fn search_entities(&self, query: &str) -> Result<Vec<Entity>> {
    if let Some(CachedValue::Entities(hit)) = self.cache.get(QueryKind::Search, query)
    {
      return Ok(hit);
    }

    let conn = self.pool.acquire().await?;
    let pattern = fts_pattern(query);
    let entities: Vec<Entity> = conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT e.id, e.name, e.entity_type
           FROM entities e
           WHERE e.id IN (
             SELECT rowid FROM entities_fts WHERE entities_fts MATCH ?1
             UNION
             SELECT o.entity_id FROM observations o
              WHERE o.id IN (
                SELECT rowid FROM observations_fts WHERE observations_fts MATCH ?1
              )
           )
           ORDER BY e.id
           LIMIT 100",
        )?;
        let heads = stmt
          .query_map(rusqlite::params![pattern], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut entities = Vec::with_capacity(heads.len());
        for (id, name, entity_type) in heads {
          entities.push(Entity {
            name,
            entity_type,
            observations: fetch_observations(conn, id)?,
          });
        }
        Ok(entities)
      })
      .await?;

    self.cache.put(
      QueryKind::Search,
      query.to_string(),
      CachedValue::Entities(entities.clone()),
      HashSet::new(),
    );
    Ok(entities)
  }

  async fn load_graph(&self) -> Result<KnowledgeGraph> {
    if let Some(CachedValue::Graph(hit)) = self.cache.get(QueryKind::Graph, "*") {
      return Ok(hit);
    }

    let conn = self.pool.acquire().await?;
    let graph: KnowledgeGraph = conn
      .call(|conn| {
        let mut by_entity: HashMap<i64, Vec<String>> = HashMap::new();
        {
          let mut stmt =
            conn.prepare("SELECT entity_id, content FROM observations ORDER BY id")?;
          let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
          })?;
          for row in rows {
            let (entity_id, content) = row?;
            by_entity.entry(entity_id).or_default().push(content);
          }
        }

        let mut entities = Vec::new();
        {
          let mut stmt =
            conn.prepare("SELECT id, name, entity_type FROM entities ORDER BY id")?;
          let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
          })?;
          for row in rows {
            let (id, name, entity_type) = row?;
            entities.push(Entity {
              name,
              entity_type,
              observations: by_entity.remove(&id).unwrap_or_default(),
            });
          }
        }

        let relations = fetch_all_relations(conn)?;
        Ok(KnowledgeGraph { entities, relations })
      })
      .await?;

    self.cache.put(
      QueryKind::Graph,
      "*".to_string(),
      CachedValue::Graph(graph.clone()),
      HashSet::new(),
    );
    Ok(graph)
  }

  async fn save_graph(&self, graph: KnowledgeGraph) -> Result<()> {
    let conn = self.pool.acquire().await?;

    conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM relations", [])?;
        tx.execute("DELETE FROM observations", [])?;
        tx.execute("DELETE FROM entities", [])?;
        {
          let mut insert_entity = tx
            .prepare("INSERT INTO entities (name, entity_type) VALUES (?1, ?2)")?;
          let mut insert_obs = tx
            .prepare("INSERT INTO observations (entity_id, content) VALUES (?1, ?2)")?;
          let mut insert_rel = tx.prepare(
            "INSERT OR IGNORE INTO relations (from_id, to_id, relation_type)
             VALUES (?1, ?2, ?3)",
          )?;

          let mut ids: HashMap<String, i64> = HashMap::new();
          for entity in &graph.entities {
            if ids.contains_key(&entity.name) {
              // Duplicate name in the snapshot: first occurrence wins.
              continue;
            }
            insert_entity
              .execute(rusqlite::params![entity.name, entity.entity_type])?;
            let id = tx.last_insert_rowid();

            let mut seen = HashSet::new();
            for content in &entity.observations {
              if seen.insert(content.as_str()) {
                insert_obs.execute(rusqlite::params![id, content])?;
              }
            }
            ids.insert(entity.name.clone(), id);
          }

          for relation in &graph.relations {
            // Relations with endpoints outside the supplied entity set are
            // silently dropped.
            let (Some(&from), Some(&to)) =
              (ids.get(&relation.from), ids.get(&relation.to))
            else {
              continue;
            };
            insert_rel.execute(rusqlite::params![from, to, relation.relation_type])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    self.cache.clear();
    Ok(())
  }

  // ── Introspection / lifecycle ─────────────────────────────────────────────

  async fn get_stats(&self) -> Result<StoreStats> {
    let conn = self.pool.acquire().await?;

    let stats = conn
      .call(|conn| {
        let count = |sql: &str| -> rusqlite::Result<i64> {
          conn.query_row(sql, [], |row| row.get(0))
        };
        let entity_count = count("SELECT COUNT(*) FROM entities")?;
        let relation_count = count("SELECT COUNT(*) FROM relations")?;
        let observation_count = count("SELECT COUNT(*) FROM observations")?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;

        Ok(StoreStats {
          entity_count:      entity_count as u64,
          relation_count:    relation_count as u64,
          observation_count: observation_count as u64,
          storage_size:      Some((page_count * page_size) as u64),
        })
      })
      .await?;
    Ok(stats)
  }

  async fn close(&self) -> Result<()> {
    self.cache.stop();
    self.pool.close().await
  }
}

// ─── Query helpers ───────────────────────────────────────────────────────────

/// `?, ?, ...` fragment for an `IN` list of `count` values.
fn placeholders(count: usize) -> String { vec!["?"; count].join(", ") }

/// Prefix-or-exact FTS5 pattern over the sanitised query: `"q"* OR q*`.
/// Embedded double quotes are stripped so the quoted phrase stays well
/// formed; other FTS syntax errors propagate to the caller unchanged.
fn fts_pattern(query: &str) -> String {
  let sanitised: String = query.chars().filter(|c| *c != '"').collect();
  format!("\"{sanitised}\"* OR {sanitised}*")
}

fn fetch_observations(
  conn: &rusqlite::Connection,
  entity_id: i64,
) -> rusqlite::Result<Vec<String>> {
  let mut stmt =
    conn.prepare("SELECT content FROM observations WHERE entity_id = ?1 ORDER BY id")?;
  stmt
    .query_map(rusqlite::params![entity_id], |row| row.get(0))?
    .collect()
}

fn fetch_all_relations(conn: &rusqlite::Connection) -> rusqlite::Result<Vec<Relation>> {
  let mut stmt = conn.prepare(
    "SELECT f.name, t.name, r.relation_type
     FROM relations r
     JOIN entities f ON f.id = r.from_id
     JOIN entities t ON t.id = r.to_id
     ORDER BY r.id",
  )?;
  stmt.query_map([], row_to_relation)?.collect()
}

fn row_to_relation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Relation> {
  Ok(Relation {
    from:          row.get(0)?,
    to:            row.get(1)?,
    relation_type: row.get(2)?,
  })
}
