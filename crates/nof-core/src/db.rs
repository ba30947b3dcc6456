//! Pooled access to the embedded SQLite store.
//!
//! Every tier keeps its configuration, results and activity log in one
//! SQLite file. Request handlers and background loops run on different
//! threads, so connections are handed out from a fixed-size pool: `checkout`
//! blocks until a connection is free and the guard puts it back on drop.
//! Multi-statement mutations go through [`Database::with_transaction`], which
//! opens an IMMEDIATE transaction so writers serialize up front instead of
//! failing on lock upgrade.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};

use crate::error::Result;

pub const DEFAULT_POOL_SIZE: usize = 5;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Pool internals
// ---------------------------------------------------------------------------

struct Pool {
    path: PathBuf,
    size: usize,
    idle: Mutex<Vec<Connection>>,
    available: Condvar,
}

impl Pool {
    fn idle(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, conn: Connection) {
        self.idle().push(conn);
        self.available.notify_one();
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    Ok(conn)
}

// ---------------------------------------------------------------------------
// PooledConnection
// ---------------------------------------------------------------------------

/// A connection checked out of the pool. Returned to the pool on drop.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<Pool>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection already returned")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection already returned")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Cloneable handle to the pooled store.
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool>,
}

impl Database {
    /// Open (or create) the database file at `path` with the default pool size.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_pool_size(path, DEFAULT_POOL_SIZE)
    }

    /// Open the database with exactly `size` connections (at least one).
    /// Parent directories are created as needed.
    pub fn open_with_pool_size(path: &Path, size: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let size = size.max(1);
        let conns = (0..size)
            .map(|_| open_connection(path))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(path = %path.display(), size, "opened database pool");

        Ok(Self {
            pool: Arc::new(Pool {
                path: path.to_path_buf(),
                size,
                idle: Mutex::new(conns),
                available: Condvar::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.pool.path
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size
    }

    /// Number of connections currently sitting idle in the pool.
    pub fn idle_connections(&self) -> usize {
        self.pool.idle().len()
    }

    /// Check a connection out of the pool, blocking until one is free.
    pub fn checkout(&self) -> PooledConnection {
        let mut idle = self.pool.idle();
        loop {
            if let Some(conn) = idle.pop() {
                return PooledConnection {
                    conn: Some(conn),
                    pool: Arc::clone(&self.pool),
                };
            }
            idle = self
                .pool
                .available
                .wait(idle)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.checkout();
        f(&conn)
    }

    /// Run `f` inside one IMMEDIATE transaction. Commits when `f` returns
    /// `Ok`, rolls back otherwise.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.checkout();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn execute<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.with_connection(|conn| Ok(conn.execute(sql, params)?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
