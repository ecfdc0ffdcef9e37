//! Retention: drop entries older than a watermark

use crate::error::{ShardError, ShardResult};
use crate::shard::clock;
use crate::shard::store::ShardStore;

impl ShardStore {
    /// Delete every entry with a timestamp strictly before `before`
    ///
    /// Returns the exact number of rows removed. Daily counters are left
    /// untouched.
    pub async fn prune_logs(&self, before: &str) -> ShardResult<u64> {
        let watermark = clock::normalize_timestamp(before).ok_or_else(|| {
            ShardError::validation(format!(
                "invalid watermark '{}', expected an RFC 3339 timestamp or YYYY-MM-DD",
                before
            ))
        })?;

        let result = sqlx::query("DELETE FROM log_entries WHERE timestamp < ?")
            .bind(&watermark)
            .execute(self.pool())
            .await?;

        tracing::debug!(
            watermark = %watermark,
            deleted = result.rows_affected(),
            "Pruned log entries"
        );

        Ok(result.rows_affected())
    }
}
