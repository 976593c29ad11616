//! Bounded pool of database handles over a single SQLite file.
//!
//! SQLite is a single-writer database; what the pool bounds is the number of
//! open handles, each running on its own [`tokio_rusqlite`] worker thread.
//! Waiters park on a semaphore and are woken when a holder releases — there
//! is no polling. Pool exhaustion is therefore a wait, never an error.

use std::{
  ops::Deref,
  path::{Path, PathBuf},
  sync::{
    Arc, Mutex, MutexGuard, PoisonError, Weak,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use tokio::{
  sync::{OwnedSemaphorePermit, Semaphore},
  task::JoinHandle,
  time::MissedTickBehavior,
};
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Tuning knobs for [`ConnectionPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
  /// Upper bound on open handles, checked out plus idle.
  pub max_connections: usize,
  /// Idle handles older than this are closed by the background sweep.
  pub idle_timeout:    Duration,
  /// How often the sweep runs.
  pub sweep_interval:  Duration,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      max_connections: 5,
      idle_timeout:    Duration::from_secs(60),
      sweep_interval:  Duration::from_secs(30),
    }
  }
}

struct IdleConn {
  conn:       Connection,
  idle_since: Instant,
}

struct PoolInner {
  path:    PathBuf,
  config:  PoolConfig,
  permits: Arc<Semaphore>,
  idle:    Mutex<Vec<IdleConn>>,
  closed:  AtomicBool,
}

/// A bounded set of open handles against one database file.
pub struct ConnectionPool {
  inner:   Arc<PoolInner>,
  sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Mutex poisoning only matters if a holder panicked mid-push; the idle list
/// is always structurally valid, so recover the guard.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionPool {
  /// Create a pool over `path`. Handles are opened lazily on first acquire.
  ///
  /// Must be called from within a tokio runtime: the idle sweep is spawned
  /// here. The sweep holds only a weak reference, so dropping the pool ends
  /// the task.
  pub fn new(path: impl AsRef<Path>, config: PoolConfig) -> Self {
    let inner = Arc::new(PoolInner {
      path:    path.as_ref().to_path_buf(),
      permits: Arc::new(Semaphore::new(config.max_connections)),
      config,
      idle:    Mutex::new(Vec::new()),
      closed:  AtomicBool::new(false),
    });

    let sweeper = tokio::spawn(sweep_loop(Arc::downgrade(&inner)));

    Self { inner, sweeper: Mutex::new(Some(sweeper)) }
  }

  /// Check out a handle: an idle one if available, a newly opened one while
  /// under the bound, otherwise wait until a holder releases.
  pub async fn acquire(&self) -> Result<PooledConn> {
    let permit = Arc::clone(&self.inner.permits)
      .acquire_owned()
      .await
      .map_err(|_| Error::PoolClosed)?;

    if let Some(idle) = lock(&self.inner.idle).pop() {
      return Ok(PooledConn {
        conn:    idle.conn,
        inner:   Arc::clone(&self.inner),
        _permit: permit,
      });
    }

    let conn = open_handle(&self.inner.path).await?;
    debug!(path = %self.inner.path.display(), "opened database handle");

    Ok(PooledConn { conn, inner: Arc::clone(&self.inner), _permit: permit })
  }

  /// Close every idle handle, stop the sweep, and fail pending and future
  /// acquisitions. Handles still checked out are dropped on release instead
  /// of returning to the pool.
  pub async fn close(&self) -> Result<()> {
    self.inner.closed.store(true, Ordering::SeqCst);
    self.inner.permits.close();

    if let Some(handle) = lock(&self.sweeper).take() {
      handle.abort();
    }

    let idle: Vec<IdleConn> = lock(&self.inner.idle).drain(..).collect();
    let mut first_err = None;
    for entry in idle {
      if let Err(e) = entry.conn.close().await {
        warn!("error closing pooled connection: {e}");
        first_err.get_or_insert(Error::Database(e));
      }
    }

    match first_err {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }
}

/// An acquired handle. Dereferences to the underlying connection and returns
/// itself to the pool's idle set on drop, waking one waiter.
pub struct PooledConn {
  conn:    Connection,
  inner:   Arc<PoolInner>,
  _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConn {
  type Target = Connection;

  fn deref(&self) -> &Connection { &self.conn }
}

impl Drop for PooledConn {
  fn drop(&mut self) {
    if self.inner.closed.load(Ordering::SeqCst) {
      // The pool shut down while this handle was out; let it die here.
      return;
    }
    lock(&self.inner.idle).push(IdleConn {
      conn:       self.conn.clone(),
      idle_since: Instant::now(),
    });
  }
}

/// Open one handle and apply the per-connection pragmas: write-ahead logging,
/// foreign-key enforcement, relaxed fsync, and a large memory-map hint. The
/// busy timeout makes concurrent writers queue on SQLite's lock instead of
/// failing with SQLITE_BUSY.
async fn open_handle(path: &Path) -> Result<Connection> {
  let conn = Connection::open(path).await?;
  conn
    .call(|conn| {
      conn.pragma_update(None, "journal_mode", "WAL")?;
      conn.pragma_update(None, "foreign_keys", "ON")?;
      conn.pragma_update(None, "synchronous", "NORMAL")?;
      conn.pragma_update(None, "mmap_size", 268_435_456_i64)?;
      conn.busy_timeout(Duration::from_secs(5))?;
      Ok(())
    })
    .await?;
  Ok(conn)
}

/// Close handles that have sat idle longer than the configured timeout,
/// bounding resource use under bursty load.
async fn sweep_loop(pool: Weak<PoolInner>) {
  let interval = match pool.upgrade() {
    Some(pool) => pool.config.sweep_interval,
    None => return,
  };
  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    ticker.tick().await;

    let Some(pool) = pool.upgrade() else { return };
    if pool.closed.load(Ordering::SeqCst) {
      return;
    }

    let expired: Vec<Connection> = {
      let mut idle = lock(&pool.idle);
      let (keep, gone): (Vec<IdleConn>, Vec<IdleConn>) = idle
        .drain(..)
        .partition(|entry| entry.idle_since.elapsed() < pool.config.idle_timeout);
      *idle = keep;
      gone.into_iter().map(|entry| entry.conn).collect()
    };

    for conn in expired {
      debug!("closing idle database handle");
      if let Err(e) = conn.close().await {
        warn!("error closing idle connection: {e}");
      }
    }
  }
}
