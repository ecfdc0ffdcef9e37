//! SQLite handle owned by one shard
//!
//! The pool is capped at a single connection: a shard is a single writer,
//! and an in-memory database only exists on the connection that created it.
//! Engine operations are implemented as `impl ShardStore` blocks in the
//! sibling modules (`ingest`, `query`, `stats`, `retention`, `health`).
//!
//! An on-disk store holds an exclusive lock on `<tenant>.lock` next to the
//! database until it is closed, so at most one live instance per tenant
//! exists across processes.

use crate::error::{ShardError, ShardResult};
use crate::shard::schema;
use fs2::FileExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Extension of the per-shard lock file
const LOCK_FILE_EXTENSION: &str = "lock";

/// Connection tuning for a shard database
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// How long a statement waits on a locked database file
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(30),
        }
    }
}

/// Exclusive lock marking a shard as live
#[derive(Debug)]
struct ShardLock {
    path: PathBuf,
    file: File,
}

impl ShardLock {
    fn acquire(path: PathBuf) -> ShardResult<Self> {
        #[allow(clippy::suspicious_open_options)]
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| ShardError::internal(format!("failed to open lock file {}: {}", path.display(), e)))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(ShardError::Unavailable(format!(
                    "{} is held by another live shard instance",
                    path.display()
                )));
            }
            return Err(ShardError::internal(format!("failed to lock {}: {}", path.display(), e)));
        }

        tracing::debug!(path = %path.display(), "Acquired shard lock");
        Ok(Self { path, file })
    }

    fn release(&self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release shard lock");
        }
    }
}

/// Embedded structured store for one tenant
#[derive(Debug, Clone)]
pub struct ShardStore {
    pool: SqlitePool,
    lock: Option<Arc<ShardLock>>,
}

impl ShardStore {
    /// Open (or create) the shard database at `path` and initialize its schema
    ///
    /// Fails with `Unavailable` while another instance holds the shard.
    pub async fn open(path: &Path, options: StoreOptions) -> ShardResult<Self> {
        let lock = ShardLock::acquire(path.with_extension(LOCK_FILE_EXTENSION))?;

        let connect = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout)
            .pragma("synchronous", "NORMAL")
            .pragma("temp_store", "memory");

        let mut store = Self::connect(connect).await?;
        store.lock = Some(Arc::new(lock));
        Ok(store)
    }

    /// Open a throwaway in-memory shard (tests, dry runs)
    pub async fn open_in_memory() -> ShardResult<Self> {
        let connect = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(connect).await
    }

    async fn connect(connect: SqliteConnectOptions) -> ShardResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect)
            .await?;

        schema::initialize(&pool).await?;

        Ok(Self { pool, lock: None })
    }

    /// Underlying pool (for advanced usage and tests)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Flush and close the database, then release the shard lock; later
    /// calls fail with an internal error
    pub async fn close(&self) {
        self.pool.close().await;
        if let Some(lock) = &self.lock {
            lock.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_on_disk_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenant.db");

        let store = ShardStore::open(&path, StoreOptions::default()).await.unwrap();
        sqlx::query("INSERT INTO shard_config (key, value, updated_at) VALUES ('k', 'v', 'now')")
            .execute(store.pool())
            .await
            .unwrap();
        store.close().await;

        let reopened = ShardStore::open(&path, StoreOptions::default()).await.unwrap();
        let value: String = sqlx::query_scalar("SELECT value FROM shard_config WHERE key = 'k'")
            .fetch_one(reopened.pool())
            .await
            .unwrap();
        assert_eq!(value, "v");
    }

    #[tokio::test]
    async fn test_second_open_is_refused_until_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenant.db");

        let first = ShardStore::open(&path, StoreOptions::default()).await.unwrap();
        let err = ShardStore::open(&path, StoreOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), "shard_unavailable");

        first.close().await;
        let second = ShardStore::open(&path, StoreOptions::default()).await.unwrap();
        second.close().await;
    }

    #[tokio::test]
    async fn test_closed_store_reports_internal_error() {
        let store = ShardStore::open_in_memory().await.unwrap();
        store.close().await;

        let err = store.prune_logs("2025-01-01").await.unwrap_err();
        assert_eq!(err.code(), "internal_error");
    }
}
