//! Schema initializer
//!
//! Runs the embedded migrations on every activation. Migrations already
//! applied are skipped and every statement is `IF NOT EXISTS`, so this is
//! safe to repeat against an existing shard file.

use crate::error::ShardResult;
use sqlx::SqlitePool;

/// Relations every shard must carry before it serves a call
pub const SHARD_TABLES: [&str; 4] = ["log_entries", "health_checks", "daily_stats", "shard_config"];

pub async fn initialize(pool: &SqlitePool) -> ShardResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;

    tracing::debug!("Shard schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::store::ShardStore;

    #[tokio::test]
    async fn test_initialize_creates_all_tables() {
        let store = ShardStore::open_in_memory().await.unwrap();

        for table in SHARD_TABLES {
            let found: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(store.pool())
            .await
            .unwrap();
            assert_eq!(found, 1, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = ShardStore::open_in_memory().await.unwrap();
        initialize(store.pool()).await.unwrap();
        initialize(store.pool()).await.unwrap();
    }
}
