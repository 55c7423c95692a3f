//! Connection pooling with WAL-mode support.
//!
//! Implements a round-robin SQLite connection pool with configurable
//! pragmas for local-disk operation (WAL) versus a cloud-synced folder
//! (DELETE journal), where WAL's auxiliary files are unsafe under
//! out-of-order sync.

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};

use super::migrations::run_migrations;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Pool acquisition and query-timing statistics (C1 `stats()`).
#[derive(Debug, Default)]
pub struct PoolStats {
    pub query_count: AtomicU64,
    pub total_query_micros: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct StorageStats {
    pub query_count: u64,
    pub avg_query_micros: u64,
    pub pool_size: usize,
}

/// Default deadline for acquiring a pooled connection (SPEC_FULL.md §4.1's
/// `PoolTimeout` failure mode: "no connection within configurable deadline,
/// default 30s").
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection pool to the embedded graph database. Each request borrows a
/// connection for the minimum span; there is no other shared mutable store
/// resource.
pub struct StoragePool {
    pool: Vec<Arc<Mutex<Connection>>>,
    next: AtomicUsize,
    stats: PoolStats,
    acquire_timeout: Duration,
}

impl StoragePool {
    /// Opens (or creates) the database at `config.database_path` and fills
    /// the pool. Migrations run once, against the first connection, before
    /// the pool is returned.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let pool_size = config.performance.connection_pool_size;
        let mut pool = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            pool.push(Arc::new(Mutex::new(Self::create_connection(
                &config.database_path,
            )?)));
        }

        {
            let conn = pool[0].lock();
            run_migrations(&conn)?;
        }

        Ok(Self {
            pool,
            next: AtomicUsize::new(0),
            stats: PoolStats::default(),
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        })
    }

    /// In-memory store for tests and short-lived tools. Each call gets its
    /// own private database — SQLite's `:memory:` databases are never shared
    /// across connections, so the pool here is effectively size 1.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_pragmas(&conn, false)?;
        run_migrations(&conn)?;
        Ok(Self {
            pool: vec![Arc::new(Mutex::new(conn))],
            next: AtomicUsize::new(0),
            stats: PoolStats::default(),
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        })
    }

    /// Overrides the pool-acquisition deadline (default 30s).
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn create_connection(database_path: &str) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open_with_flags(database_path, flags)?;
        Self::configure_pragmas(&conn, is_in_cloud_folder(database_path))?;
        Ok(conn)
    }

    fn configure_pragmas(conn: &Connection, cloud_folder: bool) -> Result<()> {
        if cloud_folder {
            conn.execute_batch(
                r#"
                PRAGMA journal_mode=DELETE;
                PRAGMA synchronous=FULL;
                PRAGMA busy_timeout=30000;
                PRAGMA foreign_keys=ON;
                "#,
            )?;
        } else {
            conn.execute_batch(
                r#"
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                PRAGMA busy_timeout=30000;
                PRAGMA cache_size=-64000;
                PRAGMA temp_store=MEMORY;
                PRAGMA mmap_size=268435456;
                PRAGMA foreign_keys=ON;
                "#,
            )?;
        }
        Ok(())
    }

    fn checkout(&self) -> Arc<Mutex<Connection>> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        self.pool[idx].clone()
    }

    /// Scoped borrow of a pooled connection. The connection returns to the
    /// pool as soon as `f` returns, whether or not it errored. Fails with
    /// `PoolTimeout` rather than blocking forever if every connection is
    /// checked out past the pool's acquisition deadline.
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let started = Instant::now();
        let conn_arc = self.checkout();
        let conn = conn_arc
            .try_lock_for(self.acquire_timeout)
            .ok_or(EngineError::PoolTimeout(self.acquire_timeout))?;
        let result = f(&conn);
        self.record_query(started);
        result
    }

    /// All-or-nothing transaction. On failure the connection is returned to
    /// the pool unpoisoned — `rusqlite::Transaction` rolls back on drop if
    /// not committed.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let started = Instant::now();
        let conn_arc = self.checkout();
        let mut conn = conn_arc
            .try_lock_for(self.acquire_timeout)
            .ok_or(EngineError::PoolTimeout(self.acquire_timeout))?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        self.record_query(started);
        Ok(result)
    }

    fn record_query(&self, started: Instant) {
        self.stats.query_count.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_query_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> StorageStats {
        let count = self.stats.query_count.load(Ordering::Relaxed);
        let total = self.stats.total_query_micros.load(Ordering::Relaxed);
        StorageStats {
            query_count: count,
            avg_query_micros: if count == 0 { 0 } else { total / count },
            pool_size: self.pool.len(),
        }
    }
}

/// Heuristic cloud-sync-folder detection, used to pick safer pragmas
/// automatically when the database lives inside Dropbox/OneDrive/etc.
fn is_in_cloud_folder(path: &str) -> bool {
    if path == ":memory:" {
        return false;
    }
    let lower = path.to_lowercase();
    lower.contains("dropbox")
        || lower.contains("onedrive")
        || lower.contains("icloud")
        || lower.contains("google drive")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_file_backed_store_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("memory.sqlite");
        let mut config = EngineConfig::new(db_path.to_str().unwrap());
        config.performance.connection_pool_size = 2;

        {
            let pool = StoragePool::open(&config).unwrap();
            pool.with_connection(|conn| {
                let version: i64 = conn.query_row(
                    "SELECT version FROM schema_version WHERE id = 1",
                    [],
                    |row| row.get(0),
                )?;
                assert!(version >= 1);
                Ok(())
            })
            .unwrap();
        }

        assert!(db_path.exists());

        // Reopening an existing store must not re-run destructive migrations.
        let pool = StoragePool::open(&config).unwrap();
        assert_eq!(pool.stats().pool_size, 2);
    }

    #[test]
    fn open_in_memory_runs_migrations() {
        let pool = StoragePool::open_in_memory().unwrap();
        pool.with_connection(|conn| {
            let version: i64 = conn.query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )?;
            assert!(version >= 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn cloud_folder_detection() {
        assert!(is_in_cloud_folder("/Users/test/Dropbox/proj/.memory/db.sqlite"));
        assert!(!is_in_cloud_folder("/home/user/proj/.memory/db.sqlite"));
    }

    #[test]
    fn with_connection_times_out_when_every_connection_is_checked_out() {
        let pool = StoragePool::open_in_memory()
            .unwrap()
            .with_acquire_timeout(Duration::from_millis(20));
        let held = pool.pool[0].clone();
        let _guard = held.lock();

        let err = pool.with_connection(|_conn| Ok(())).unwrap_err();
        assert!(matches!(err, EngineError::PoolTimeout(_)));
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let pool = StoragePool::open_in_memory().unwrap();
        let result: Result<()> = pool.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO entities (name, normalized_name, entity_type, created_at, updated_at, mention_count) VALUES ('x','x','other','now','now',1)",
                [],
            )?;
            Err(EngineError::InvalidInput("force rollback".into()))
        });
        assert!(result.is_err());
        pool.with_connection(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
    }
}
