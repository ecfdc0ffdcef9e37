//! Ingestion engine
//!
//! Ids are random v4 UUIDs and timestamps are assigned here, never taken from
//! the caller. Counter maintenance is left to the caller.

use crate::error::ShardResult;
use crate::shard::clock;
use crate::shard::store::ShardStore;
use crate::shard::types::{LogEntry, LogInput};
use sqlx::{Sqlite, SqliteConnection};
use uuid::Uuid;

const INSERT_LOG_SQL: &str = "INSERT INTO log_entries (id, timestamp, level, message, context, request_id)
     VALUES (?, ?, ?, ?, ?, ?)";

impl ShardStore {
    /// Validate and insert a single entry
    pub async fn insert_log(&self, input: LogInput) -> ShardResult<LogEntry> {
        let validated = input.validate()?;
        let entry = validated.into_entry(new_entry_id(), clock::now_timestamp());

        let mut conn = self.pool().acquire().await?;
        insert_entry(&mut conn, &entry).await?;

        Ok(entry)
    }

    /// Insert a batch in one transaction
    ///
    /// Every entry gets its own id but the whole batch shares one timestamp.
    /// The returned entries keep input order. Any failure rolls back the whole
    /// batch.
    pub async fn insert_logs_batch(&self, inputs: Vec<LogInput>) -> ShardResult<Vec<LogEntry>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let validated = inputs
            .into_iter()
            .map(LogInput::validate)
            .collect::<ShardResult<Vec<_>>>()?;

        let timestamp = clock::now_timestamp();
        let entries: Vec<LogEntry> = validated
            .into_iter()
            .map(|v| v.into_entry(new_entry_id(), timestamp.clone()))
            .collect();

        let mut tx = self.pool().begin().await?;
        for entry in &entries {
            insert_entry(&mut tx, entry).await?;
        }
        tx.commit().await?;

        tracing::debug!(count = entries.len(), "Inserted log batch");
        Ok(entries)
    }
}

fn new_entry_id() -> String {
    Uuid::new_v4().to_string()
}

async fn insert_entry(conn: &mut SqliteConnection, entry: &LogEntry) -> ShardResult<()> {
    let context = entry
        .context
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query::<Sqlite>(INSERT_LOG_SQL)
        .bind(&entry.id)
        .bind(&entry.timestamp)
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(context)
        .bind(&entry.request_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::types::Level;
    use serde_json::json;
    use std::collections::HashSet;

    async fn count_rows(store: &ShardStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM log_entries")
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_log_populates_entry() {
        let store = ShardStore::open_in_memory().await.unwrap();

        let entry = store
            .insert_log(
                LogInput::new("INFO", "start")
                    .with_context(json!({"user": "u1"}))
                    .with_request_id("req-1"),
            )
            .await
            .unwrap();

        assert!(!entry.id.is_empty());
        assert!(clock::parse_timestamp(&entry.timestamp).is_some());
        assert_eq!(entry.level, Level::Info);
        assert_eq!(entry.request_id.as_deref(), Some("req-1"));
        assert_eq!(count_rows(&store).await, 1);
    }

    #[tokio::test]
    async fn test_insert_log_rejects_unknown_level() {
        let store = ShardStore::open_in_memory().await.unwrap();

        let err = store.insert_log(LogInput::new("TRACE", "nope")).await.unwrap_err();

        assert_eq!(err.code(), "validation_error");
        assert_eq!(count_rows(&store).await, 0);
    }

    #[tokio::test]
    async fn test_batch_shares_timestamp_with_distinct_ids() {
        let store = ShardStore::open_in_memory().await.unwrap();

        let inputs = (0..5)
            .map(|i| LogInput::new("DEBUG", format!("message {}", i)))
            .collect();
        let entries = store.insert_logs_batch(inputs).await.unwrap();

        assert_eq!(entries.len(), 5);
        let timestamps: HashSet<_> = entries.iter().map(|e| e.timestamp.as_str()).collect();
        assert_eq!(timestamps.len(), 1);
        let ids: HashSet<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), 5);
        assert_eq!(entries[3].message, "message 3");
    }

    #[tokio::test]
    async fn test_invalid_entry_rejects_whole_batch() {
        let store = ShardStore::open_in_memory().await.unwrap();

        let inputs = vec![
            LogInput::new("INFO", "ok"),
            LogInput::new("LOUD", "bad"),
        ];
        assert!(store.insert_logs_batch(inputs).await.is_err());
        assert_eq!(count_rows(&store).await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_mid_batch_rolls_back() {
        let store = ShardStore::open_in_memory().await.unwrap();
        // Aborts the second insert of the transaction
        sqlx::query("CREATE TRIGGER fail_second BEFORE INSERT ON log_entries
                     WHEN (SELECT COUNT(*) FROM log_entries) >= 1
                     BEGIN SELECT RAISE(ABORT, 'disk full'); END")
            .execute(store.pool())
            .await
            .unwrap();

        let inputs = vec![LogInput::new("INFO", "a"), LogInput::new("INFO", "b")];
        let err = store.insert_logs_batch(inputs).await.unwrap_err();

        assert_eq!(err.code(), "internal_error");
        assert!(err.message().contains("disk full"));
        assert_eq!(count_rows(&store).await, 0);
    }
}
