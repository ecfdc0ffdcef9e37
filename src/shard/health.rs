//! Durable health-check state: monitored URLs, the pending alarm, and the
//! bounded per-URL probe history.

use crate::error::{ShardError, ShardResult};
use crate::shard::clock;
use crate::shard::store::ShardStore;
use crate::shard::types::HealthCheckRecord;
use chrono::{DateTime, Utc};
use sqlx::Sqlite;

/// Config key holding the monitored URL list (JSON array)
pub const HEALTH_URLS_KEY: &str = "health_urls";

/// Config key holding the next alarm instant
pub const HEALTH_ALARM_KEY: &str = "health_alarm";

/// Records kept per URL
pub const DEFAULT_HISTORY_LIMIT: u32 = 1000;

/// Records returned by `health_history` when the caller gives no limit
pub const DEFAULT_HISTORY_PAGE: u32 = 50;

/// Validate a monitored URL list: absolute http(s) URLs, duplicates collapsed
pub fn normalize_health_urls(urls: Vec<String>) -> ShardResult<Vec<String>> {
    let mut unique: Vec<String> = Vec::with_capacity(urls.len());

    for raw in urls {
        let trimmed = raw.trim();
        let parsed = url::Url::parse(trimmed)
            .map_err(|e| ShardError::validation(format!("invalid URL '{}': {}", trimmed, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ShardError::validation(format!(
                "unsupported URL scheme '{}' in '{}'",
                parsed.scheme(),
                trimmed
            )));
        }
        if !unique.iter().any(|u| u == trimmed) {
            unique.push(trimmed.to_string());
        }
    }

    Ok(unique)
}

impl ShardStore {
    async fn config_value(&self, key: &str) -> ShardResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM shard_config WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        Ok(value)
    }

    async fn put_config_value(&self, key: &str, value: &str) -> ShardResult<()> {
        sqlx::query(
            "INSERT INTO shard_config (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(clock::now_timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete_config_value(&self, key: &str) -> ShardResult<()> {
        sqlx::query("DELETE FROM shard_config WHERE key = ?")
            .bind(key)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Persisted monitored URLs (empty when never configured)
    pub async fn health_urls(&self) -> ShardResult<Vec<String>> {
        match self.config_value(HEALTH_URLS_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn save_health_urls(&self, urls: &[String]) -> ShardResult<()> {
        let raw = serde_json::to_string(urls)?;
        self.put_config_value(HEALTH_URLS_KEY, &raw).await
    }

    /// Pending alarm instant, if one is armed
    pub async fn health_alarm(&self) -> ShardResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.config_value(HEALTH_ALARM_KEY).await? else {
            return Ok(None);
        };

        if let Some(at) = clock::parse_timestamp(&raw) {
            return Ok(Some(at));
        }

        // Unreadable: drop it so activation still succeeds
        tracing::warn!(value = %raw, "Discarding unparseable health alarm");
        self.delete_config_value(HEALTH_ALARM_KEY).await?;
        Ok(None)
    }

    pub async fn set_health_alarm(&self, at: DateTime<Utc>) -> ShardResult<()> {
        self.put_config_value(HEALTH_ALARM_KEY, &clock::format_timestamp(at)).await
    }

    pub async fn clear_health_alarm(&self) -> ShardResult<()> {
        self.delete_config_value(HEALTH_ALARM_KEY).await
    }

    /// Store one probe outcome and trim that URL's history to `keep` records
    pub async fn record_health_check(
        &self,
        url: &str,
        status: u16,
        latency_ms: u64,
        keep: u32,
    ) -> ShardResult<HealthCheckRecord> {
        let mut tx = self.pool().begin().await?;

        let record = sqlx::query_as::<Sqlite, HealthCheckRecord>(
            "INSERT INTO health_checks (url, status, latency_ms, checked_at) VALUES (?, ?, ?, ?)
             RETURNING id, url, status, latency_ms, checked_at",
        )
        .bind(url)
        .bind(i64::from(status))
        .bind(i64::try_from(latency_ms).unwrap_or(i64::MAX))
        .bind(clock::now_timestamp())
        .fetch_one(&mut *tx)
        .await?;

        let trimmed = sqlx::query(
            "DELETE FROM health_checks
             WHERE url = ?1 AND id NOT IN (
                 SELECT id FROM health_checks
                 WHERE url = ?1
                 ORDER BY checked_at DESC, id DESC
                 LIMIT ?2
             )",
        )
        .bind(url)
        .bind(i64::from(keep.max(1)))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if trimmed.rows_affected() > 0 {
            tracing::trace!(url = %url, trimmed = trimmed.rows_affected(), "Trimmed health history");
        }

        Ok(record)
    }

    /// Most recent probe records, optionally for one URL
    pub async fn health_history(&self, url: Option<&str>, limit: u32) -> ShardResult<Vec<HealthCheckRecord>> {
        let limit = i64::from(limit.max(1));

        let records = match url {
            Some(url) => {
                sqlx::query_as::<_, HealthCheckRecord>(
                    "SELECT id, url, status, latency_ms, checked_at FROM health_checks
                     WHERE url = ?
                     ORDER BY checked_at DESC, id DESC
                     LIMIT ?",
                )
                .bind(url)
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, HealthCheckRecord>(
                    "SELECT id, url, status, latency_ms, checked_at FROM health_checks
                     ORDER BY checked_at DESC, id DESC
                     LIMIT ?",
                )
                .bind(limit)
                .fetch_all(self.pool())
                .await?
            }
        };

        Ok(records)
    }
}
