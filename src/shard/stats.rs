//! Daily per-level counters
//!
//! Every increment is one `INSERT .. ON CONFLICT DO UPDATE` statement, so the
//! zero row for a new day and the addition land together. Rows are never
//! decremented and never pruned.

use crate::error::{ShardError, ShardResult};
use crate::shard::clock;
use crate::shard::store::ShardStore;
use crate::shard::types::{DailyStat, Level, StatsDelta};
use chrono::{Duration, NaiveDate, Utc};
use std::collections::HashMap;

/// Longest window `get_stats_range` will materialize
pub const MAX_STATS_RANGE_DAYS: u32 = 366;

const UPSERT_STATS_SQL: &str = "INSERT INTO daily_stats (date, debug, info, warn, error)
     VALUES (?, ?, ?, ?, ?)
     ON CONFLICT(date) DO UPDATE SET
         debug = debug + excluded.debug,
         info = info + excluded.info,
         warn = warn + excluded.warn,
         error = error + excluded.error
     RETURNING date, debug, info, warn, error";

/// Per-level increments folded from any number of deltas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Increments {
    debug: i64,
    info: i64,
    warn: i64,
    error: i64,
}

impl Increments {
    fn add(&mut self, level: Level, count: u32) {
        let slot = match level {
            Level::Debug => &mut self.debug,
            Level::Info => &mut self.info,
            Level::Warn => &mut self.warn,
            Level::Error => &mut self.error,
        };
        *slot += i64::from(count);
    }
}

impl ShardStore {
    /// Add `count` to today's counter for `level`, returning the day's snapshot
    pub async fn record_stats(&self, level: Level, count: u32) -> ShardResult<DailyStat> {
        let mut increments = Increments::default();
        increments.add(level, count);
        self.apply_increments(&clock::today(), increments).await
    }

    /// Fold all deltas and apply them with a single statement
    pub async fn record_stats_batch(&self, deltas: &[StatsDelta]) -> ShardResult<DailyStat> {
        let increments = deltas.iter().fold(Increments::default(), |mut acc, delta| {
            acc.add(delta.level, delta.count);
            acc
        });
        self.apply_increments(&clock::today(), increments).await
    }

    async fn apply_increments(&self, date: &str, inc: Increments) -> ShardResult<DailyStat> {
        let snapshot = sqlx::query_as::<_, DailyStat>(UPSERT_STATS_SQL)
            .bind(date)
            .bind(inc.debug)
            .bind(inc.info)
            .bind(inc.warn)
            .bind(inc.error)
            .fetch_one(self.pool())
            .await?;

        Ok(snapshot)
    }

    /// Counters for `date` (default today); a zero row when nothing was recorded
    pub async fn get_stats(&self, date: Option<&str>) -> ShardResult<DailyStat> {
        let date = match date {
            Some(raw) => clock::parse_date_key(raw)
                .ok_or_else(|| {
                    ShardError::validation(format!("invalid date '{}', expected YYYY-MM-DD", raw))
                })?
                .format(clock::DATE_FORMAT)
                .to_string(),
            None => clock::today(),
        };

        let row = sqlx::query_as::<_, DailyStat>(
            "SELECT date, debug, info, warn, error FROM daily_stats WHERE date = ?",
        )
        .bind(&date)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.unwrap_or_else(|| DailyStat::empty(date)))
    }

    /// Snapshots for today and the `days - 1` days before it, newest first
    ///
    /// Missing days are zero rows. `days` is capped at [`MAX_STATS_RANGE_DAYS`].
    pub async fn get_stats_range(&self, days: u32) -> ShardResult<Vec<DailyStat>> {
        let days = days.min(MAX_STATS_RANGE_DAYS);
        if days == 0 {
            return Ok(Vec::new());
        }

        let today = Utc::now().date_naive();
        let dates: Vec<NaiveDate> = (0..days)
            .map(|offset| today - Duration::days(i64::from(offset)))
            .collect();
        let oldest = dates[dates.len() - 1].format(clock::DATE_FORMAT).to_string();
        let newest = today.format(clock::DATE_FORMAT).to_string();

        let rows = sqlx::query_as::<_, DailyStat>(
            "SELECT date, debug, info, warn, error FROM daily_stats WHERE date BETWEEN ? AND ?",
        )
        .bind(&oldest)
        .bind(&newest)
        .fetch_all(self.pool())
        .await?;

        let mut by_date: HashMap<String, DailyStat> =
            rows.into_iter().map(|row| (row.date.clone(), row)).collect();

        Ok(dates
            .into_iter()
            .map(|date| {
                let key = date.format(clock::DATE_FORMAT).to_string();
                by_date.remove(&key).unwrap_or_else(|| DailyStat::empty(key))
            })
            .collect())
    }
}
