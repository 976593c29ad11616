//! In-process cache of prior read results, scoped to one store instance.
//!
//! Entries live under a combined byte budget with LRU eviction and a fixed
//! TTL. Entity- and relation-family entries are tagged with the entity names
//! they depend on, so a mutation invalidates exactly the entries whose tag
//! set intersects the mutated names. Search and whole-graph entries are
//! membership-dynamic — a newly created entity can join any search result —
//! so entity mutations clear those families outright.

use std::{
  collections::{HashMap, HashSet},
  sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
  time::{Duration, Instant},
};

use mnemo_core::{Entity, KnowledgeGraph, Relation};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::debug;

/// Tuning knobs for [`QueryCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
  /// Combined budget across all entry families, in approximate bytes.
  pub max_bytes:      usize,
  /// Entries older than this are evicted on read or by the sweep.
  pub ttl:            Duration,
  /// How often the expiry sweep runs.
  pub sweep_interval: Duration,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_bytes:      16 * 1024 * 1024,
      ttl:            Duration::from_secs(60),
      sweep_interval: Duration::from_secs(30),
    }
  }
}

/// Which read operation produced an entry. Families are invalidated
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
  Entities,
  Relations,
  Search,
  Graph,
}

/// A cached read result.
#[derive(Debug, Clone)]
pub enum CachedValue {
  Entities(Vec<Entity>),
  Relations(Vec<Relation>),
  Graph(KnowledgeGraph),
}

struct Entry {
  value:     CachedValue,
  bytes:     usize,
  inserted:  Instant,
  /// Monotonic touch counter; the smallest value is the LRU victim.
  last_used: u64,
  /// Entity names this entry depends on. Empty for search/graph entries,
  /// which are invalidated by family instead.
  tags:      HashSet<String>,
}

struct CacheInner {
  config:      CacheConfig,
  entries:     HashMap<(QueryKind, String), Entry>,
  total_bytes: usize,
  touch:       u64,
}

/// Size- and time-bounded cache keyed by `(query kind, query string)`.
pub struct QueryCache {
  inner:   Arc<Mutex<CacheInner>>,
  sweeper: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl QueryCache {
  /// Create a cache and spawn its expiry sweep. The sweep holds only a weak
  /// reference, so dropping the cache ends the task.
  pub fn new(config: CacheConfig) -> Self {
    let inner = Arc::new(Mutex::new(CacheInner {
      config,
      entries:     HashMap::new(),
      total_bytes: 0,
      touch:       0,
    }));

    let sweeper = tokio::spawn(sweep_loop(Arc::downgrade(&inner)));

    Self { inner, sweeper: Mutex::new(Some(sweeper)) }
  }

  /// Look up `key` in `kind`'s family. Reading an expired entry evicts it
  /// and misses.
  pub fn get(&self, kind: QueryKind, key: &str) -> Option<CachedValue> {
    let mut inner = lock(&self.inner);
    let ttl = inner.config.ttl;
    let owned = (kind, key.to_string());

    let expired = match inner.entries.get(&owned) {
      Some(entry) => entry.inserted.elapsed() >= ttl,
      None => return None,
    };
    if expired {
      if let Some(entry) = inner.entries.remove(&owned) {
        inner.total_bytes -= entry.bytes;
      }
      return None;
    }

    inner.touch += 1;
    let touch = inner.touch;
    let entry = inner.entries.get_mut(&owned)?;
    entry.last_used = touch;
    Some(entry.value.clone())
  }

  /// Insert an entry, evicting least-recently-used entries until it fits.
  /// Values larger than the whole budget are not cached.
  pub fn put(
    &self,
    kind: QueryKind,
    key: String,
    value: CachedValue,
    tags: HashSet<String>,
  ) {
    let bytes = approx_size(&value);
    let mut inner = lock(&self.inner);
    if bytes > inner.config.max_bytes {
      return;
    }

    if let Some(old) = inner.entries.remove(&(kind, key.clone())) {
      inner.total_bytes -= old.bytes;
    }

    while inner.total_bytes + bytes > inner.config.max_bytes {
      let victim = inner
        .entries
        .iter()
        .min_by_key(|(_, entry)| entry.last_used)
        .map(|(key, _)| key.clone());
      let Some(victim) = victim else { break };
      if let Some(entry) = inner.entries.remove(&victim) {
        inner.total_bytes -= entry.bytes;
        debug!(kind = ?victim.0, key = %victim.1, "evicted cache entry");
      }
    }

    inner.touch += 1;
    let entry = Entry {
      value,
      bytes,
      inserted: Instant::now(),
      last_used: inner.touch,
      tags,
    };
    inner.total_bytes += bytes;
    inner.entries.insert((kind, key), entry);
  }

  /// Invalidate after a mutation of the named entities: drop tagged entries
  /// whose tag set intersects `names`, and clear the search and whole-graph
  /// families (their membership cannot be tag-tracked).
  pub fn invalidate_entities(&self, names: &[String]) {
    let mut inner = lock(&self.inner);
    let removed: Vec<(QueryKind, String)> = inner
      .entries
      .iter()
      .filter(|((kind, _), entry)| {
        matches!(kind, QueryKind::Search | QueryKind::Graph)
          || names.iter().any(|name| entry.tags.contains(name))
      })
      .map(|(key, _)| key.clone())
      .collect();
    for key in removed {
      if let Some(entry) = inner.entries.remove(&key) {
        inner.total_bytes -= entry.bytes;
      }
    }
  }

  /// Invalidate after a relation-affecting mutation: clear the relation and
  /// whole-graph families entirely, trading precision for simplicity.
  pub fn invalidate_relations(&self) {
    let mut inner = lock(&self.inner);
    let removed: Vec<(QueryKind, String)> = inner
      .entries
      .keys()
      .filter(|(kind, _)| matches!(kind, QueryKind::Relations | QueryKind::Graph))
      .cloned()
      .collect();
    for key in removed {
      if let Some(entry) = inner.entries.remove(&key) {
        inner.total_bytes -= entry.bytes;
      }
    }
  }

  /// Drop everything. Used by destructive graph replacement.
  pub fn clear(&self) {
    let mut inner = lock(&self.inner);
    inner.entries.clear();
    inner.total_bytes = 0;
  }

  /// Stop the expiry sweep. Entries remain readable until drop.
  pub fn stop(&self) {
    if let Some(handle) = lock(&self.sweeper).take() {
      handle.abort();
    }
  }

  #[cfg(test)]
  pub(crate) fn entry_count(&self) -> usize { lock(&self.inner).entries.len() }
}

/// Rough in-memory footprint of a cached value. Per-item constants cover
/// `String`/`Vec` headers; exactness is not required, only monotonicity.
fn approx_size(value: &CachedValue) -> usize {
  fn entity(e: &Entity) -> usize {
    e.name.len()
      + e.entity_type.len()
      + e.observations.iter().map(|o| o.len() + 24).sum::<usize>()
      + 72
  }
  fn relation(r: &Relation) -> usize {
    r.from.len() + r.to.len() + r.relation_type.len() + 72
  }

  match value {
    CachedValue::Entities(entities) => {
      entities.iter().map(entity).sum::<usize>() + 24
    }
    CachedValue::Relations(relations) => {
      relations.iter().map(relation).sum::<usize>() + 24
    }
    CachedValue::Graph(graph) => {
      graph.entities.iter().map(entity).sum::<usize>()
        + graph.relations.iter().map(relation).sum::<usize>()
        + 48
    }
  }
}

/// Purge expired entries so a quiet cache does not pin memory for the full
/// byte budget.
async fn sweep_loop(cache: Weak<Mutex<CacheInner>>) {
  let interval = match cache.upgrade() {
    Some(inner) => lock(&inner).config.sweep_interval,
    None => return,
  };
  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    ticker.tick().await;

    let Some(inner) = cache.upgrade() else { return };
    let mut inner = lock(&inner);
    let ttl = inner.config.ttl;
    let expired: Vec<(QueryKind, String)> = inner
      .entries
      .iter()
      .filter(|(_, entry)| entry.inserted.elapsed() >= ttl)
      .map(|(key, _)| key.clone())
      .collect();
    for key in expired {
      if let Some(entry) = inner.entries.remove(&key) {
        inner.total_bytes -= entry.bytes;
      }
    }
  }
}
