//! Query engine
//!
//! Turns a [`LogQuery`] into one parameterized statement: every present
//! filter adds an `AND` predicate, results are newest first and paginated.

use crate::error::ShardResult;
use crate::shard::clock;
use crate::shard::store::ShardStore;
use crate::shard::types::LogEntry;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

/// Rows returned when the caller gives no (or an unusable) limit
pub const DEFAULT_QUERY_LIMIT: u32 = 100;

/// Upper bound applied to any requested limit
pub const MAX_QUERY_LIMIT: u32 = 10_000;

/// Prefix of structured-context filter keys (`context.user=u1`)
const CONTEXT_PREFIX: &str = "context.";

/// Filter for log queries (all filters AND together)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    /// Exact level match
    pub level: Option<String>,

    /// Inclusive lower bound on timestamp
    pub since: Option<String>,

    /// Inclusive upper bound on timestamp
    pub until: Option<String>,

    /// Exact request id match
    pub request_id: Option<String>,

    /// Case-sensitive substring of the message
    pub search: Option<String>,

    /// Equality on fields of the structured context
    pub context: Vec<(String, String)>,

    pub limit: u32,

    pub offset: u32,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            level: None,
            since: None,
            until: None,
            request_id: None,
            search: None,
            context: Vec::new(),
            limit: DEFAULT_QUERY_LIMIT,
            offset: 0,
        }
    }
}

impl LogQuery {
    /// Build a query from raw string parameters (e.g. a URL query string)
    ///
    /// Unknown keys are ignored, empty values count as absent, and a limit or
    /// offset that is not a non-negative integer falls back to its default.
    ///
    /// ```
    /// use logshard::shard::LogQuery;
    ///
    /// let query = LogQuery::from_params([
    ///     ("level", "ERROR"),
    ///     ("context.user", "u1"),
    ///     ("limit", "abc"),
    ///     ("colour", "blue"),
    /// ]);
    /// assert_eq!(query.level.as_deref(), Some("ERROR"));
    /// assert_eq!(query.context, vec![("user".to_string(), "u1".to_string())]);
    /// assert_eq!(query.limit, 100);
    /// ```
    pub fn from_params<I, K, V>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = Self::default();

        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());
            if value.is_empty() {
                continue;
            }

            match key {
                "level" => query.level = Some(value.to_string()),
                "since" => query.since = Some(value.to_string()),
                "until" => query.until = Some(value.to_string()),
                "request_id" => query.request_id = Some(value.to_string()),
                "search" => query.search = Some(value.to_string()),
                "limit" => query.limit = value.parse().unwrap_or(DEFAULT_QUERY_LIMIT),
                "offset" => query.offset = value.parse().unwrap_or(0),
                _ => {
                    if let Some(field) = key.strip_prefix(CONTEXT_PREFIX) {
                        if is_valid_context_key(field) {
                            query.context.push((field.to_string(), value.to_string()));
                        }
                    }
                }
            }
        }

        query
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn since(mut self, since: impl Into<String>) -> Self {
        self.since = Some(since.into());
        self
    }

    pub fn until(mut self, until: impl Into<String>) -> Self {
        self.until = Some(until.into());
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if is_valid_context_key(&key) {
            self.context.push((key, value.into()));
        }
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Limit actually applied, after clamping
    pub fn effective_limit(&self, max_limit: u32) -> u32 {
        self.limit.clamp(1, max_limit.max(1))
    }

    fn build(&self, max_limit: u32) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new(
            "SELECT id, timestamp, level, message, context, request_id FROM log_entries WHERE 1=1",
        );

        if let Some(level) = &self.level {
            qb.push(" AND level = ").push_bind(level.clone());
        }

        if let Some(since) = &self.since {
            qb.push(" AND timestamp >= ").push_bind(bound_value(since));
        }

        if let Some(until) = &self.until {
            qb.push(" AND timestamp <= ").push_bind(bound_value(until));
        }

        if let Some(request_id) = &self.request_id {
            qb.push(" AND request_id = ").push_bind(request_id.clone());
        }

        if let Some(search) = &self.search {
            // instr is case-sensitive, unlike LIKE
            qb.push(" AND instr(message, ").push_bind(search.clone()).push(") > 0");
        }

        for (key, value) in &self.context {
            qb.push(" AND CAST(json_extract(context, ")
                .push_bind(format!("$.\"{}\"", key))
                .push(") AS TEXT) = ")
                .push_bind(value.clone());
        }

        qb.push(" ORDER BY timestamp DESC, rowid DESC LIMIT ")
            .push_bind(i64::from(self.effective_limit(max_limit)))
            .push(" OFFSET ")
            .push_bind(i64::from(self.offset));

        qb
    }
}

/// Bounds compare as strings, so parseable instants are rewritten into the
/// stored form first; anything else is used verbatim.
fn bound_value(raw: &str) -> String {
    clock::normalize_timestamp(raw).unwrap_or_else(|| raw.to_string())
}

fn is_valid_context_key(key: &str) -> bool {
    !key.is_empty() && !key.contains('"')
}

impl ShardStore {
    /// Query entries newest first
    ///
    /// # Example
    ///
    /// ```ignore
    /// let query = LogQuery::default().level("ERROR").since("2025-01-01");
    /// let errors = store.query_logs(&query, MAX_QUERY_LIMIT).await?;
    /// ```
    pub async fn query_logs(&self, query: &LogQuery, max_limit: u32) -> ShardResult<Vec<LogEntry>> {
        let entries = query
            .build(max_limit)
            .build_query_as::<LogEntry>()
            .fetch_all(self.pool())
            .await?;

        Ok(entries)
    }

    /// Total number of stored entries
    pub async fn count_logs(&self) -> ShardResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM log_entries")
            .fetch_one(self.pool())
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::types::{Level, LogInput};
    use serde_json::json;

    async fn seeded_store() -> ShardStore {
        let store = ShardStore::open_in_memory().await.unwrap();
        let rows = [
            ("2025-01-01T10:00:00.000Z", "INFO", "service started", Some(json!({"user": "u1", "attempt": 1})), Some("r1")),
            ("2025-01-02T10:00:00.000Z", "ERROR", "Database Timeout", Some(json!({"user": "u2", "attempt": 3})), Some("r2")),
            ("2025-01-03T10:00:00.000Z", "ERROR", "database timeout again", Some(json!({"user": "u1", "ok": true})), None),
            ("2025-01-04T10:00:00.000Z", "DEBUG", "cache miss", None, Some("r2")),
        ];

        for (i, (ts, level, message, context, request_id)) in rows.into_iter().enumerate() {
            sqlx::query(
                "INSERT INTO log_entries (id, timestamp, level, message, context, request_id)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(format!("id-{}", i))
            .bind(ts)
            .bind(level)
            .bind(message)
            .bind(context.map(|c| c.to_string()))
            .bind(request_id)
            .execute(store.pool())
            .await
            .unwrap();
        }

        store
    }

    fn ids(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_empty_query_returns_newest_first() {
        let store = seeded_store().await;

        let entries = store.query_logs(&LogQuery::default(), MAX_QUERY_LIMIT).await.unwrap();

        assert_eq!(ids(&entries), vec!["id-3", "id-2", "id-1", "id-0"]);
    }

    #[tokio::test]
    async fn test_level_filter() {
        let store = seeded_store().await;

        let entries = store
            .query_logs(&LogQuery::default().level("ERROR"), MAX_QUERY_LIMIT)
            .await
            .unwrap();

        assert_eq!(ids(&entries), vec!["id-2", "id-1"]);
        assert!(entries.iter().all(|e| e.level == Level::Error));
    }

    #[tokio::test]
    async fn test_time_bounds_are_inclusive() {
        let store = seeded_store().await;

        let query = LogQuery::default()
            .since("2025-01-02T10:00:00.000Z")
            .until("2025-01-03T10:00:00Z");
        let entries = store.query_logs(&query, MAX_QUERY_LIMIT).await.unwrap();

        assert_eq!(ids(&entries), vec!["id-2", "id-1"]);
    }

    #[tokio::test]
    async fn test_search_is_case_sensitive_substring() {
        let store = seeded_store().await;

        let entries = store
            .query_logs(&LogQuery::default().search("database"), MAX_QUERY_LIMIT)
            .await
            .unwrap();
        assert_eq!(ids(&entries), vec!["id-2"]);

        let entries = store
            .query_logs(&LogQuery::default().search("%"), MAX_QUERY_LIMIT)
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_context_filters_and_together() {
        let store = seeded_store().await;

        let query = LogQuery::default().context("user", "u1");
        let entries = store.query_logs(&query, MAX_QUERY_LIMIT).await.unwrap();
        assert_eq!(ids(&entries), vec!["id-2", "id-0"]);

        let query = LogQuery::default().context("user", "u1").context("attempt", "1");
        let entries = store.query_logs(&query, MAX_QUERY_LIMIT).await.unwrap();
        assert_eq!(ids(&entries), vec!["id-0"]);
    }

    #[tokio::test]
    async fn test_context_matches_non_string_values_textually() {
        let store = seeded_store().await;

        let entries = store
            .query_logs(&LogQuery::default().context("attempt", "3"), MAX_QUERY_LIMIT)
            .await
            .unwrap();
        assert_eq!(ids(&entries), vec!["id-1"]);

        let entries = store
            .query_logs(&LogQuery::default().context("ok", "1"), MAX_QUERY_LIMIT)
            .await
            .unwrap();
        assert_eq!(ids(&entries), vec!["id-2"]);
    }

    #[tokio::test]
    async fn test_request_id_and_pagination() {
        let store = seeded_store().await;

        let entries = store
            .query_logs(&LogQuery::default().request_id("r2"), MAX_QUERY_LIMIT)
            .await
            .unwrap();
        assert_eq!(ids(&entries), vec!["id-3", "id-1"]);

        let page = store
            .query_logs(&LogQuery::default().limit(2).offset(1), MAX_QUERY_LIMIT)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["id-2", "id-1"]);
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let store = seeded_store().await;

        let entries = store
            .query_logs(&LogQuery::default().limit(0), MAX_QUERY_LIMIT)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);

        let entries = store.query_logs(&LogQuery::default().limit(50), 3).await.unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[tokio::test]
    async fn test_batch_entries_keep_insertion_order_within_timestamp() {
        let store = ShardStore::open_in_memory().await.unwrap();
        let first = store
            .insert_logs_batch(vec![LogInput::new("INFO", "a1"), LogInput::new("INFO", "a2")])
            .await
            .unwrap();

        let entries = store.query_logs(&LogQuery::default(), MAX_QUERY_LIMIT).await.unwrap();
        assert_eq!(entries[0].id, first[1].id);
        assert_eq!(entries[1].id, first[0].id);
    }

    #[test]
    fn test_from_params_ignores_unknown_and_bad_numbers() {
        let query = LogQuery::from_params([
            ("level", "WARN"),
            ("offset", "-4"),
            ("limit", "25"),
            ("context.", "x"),
            ("context.a\"b", "x"),
            ("search", ""),
            ("format", "csv"),
        ]);

        assert_eq!(query.level.as_deref(), Some("WARN"));
        assert_eq!(query.offset, 0);
        assert_eq!(query.limit, 25);
        assert!(query.context.is_empty());
        assert!(query.search.is_none());
    }
}
