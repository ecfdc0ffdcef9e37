//! Shard data model

use crate::error::{ShardError, ShardResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt;
use std::str::FromStr;

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Debug, Level::Info, Level::Warn, Level::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ShardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" => Ok(Level::Warn),
            "ERROR" => Ok(Level::Error),
            "" => Err(ShardError::validation("level is required")),
            other => Err(ShardError::validation(format!(
                "invalid level '{}', expected one of DEBUG, INFO, WARN, ERROR",
                other
            ))),
        }
    }
}

/// Caller-supplied log payload, validated before insertion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogInput {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl LogInput {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Decode a batch payload, rejecting anything that is not an array of objects
    pub fn batch_from_value(value: Value) -> ShardResult<Vec<LogInput>> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    serde_json::from_value(item).map_err(|e| {
                        ShardError::validation(format!("invalid log entry at index {}: {}", i, e))
                    })
                })
                .collect(),
            _ => Err(ShardError::validation("batch payload must be an array")),
        }
    }

    /// Check level, message and context shape
    pub(crate) fn validate(self) -> ShardResult<ValidatedLog> {
        let level = self.level.parse::<Level>()?;
        if self.message.is_empty() {
            return Err(ShardError::validation("message is required"));
        }

        let context = match self.context {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => {
                if let Some((key, _)) = map.iter().find(|(_, v)| v.is_object() || v.is_array()) {
                    return Err(ShardError::validation(format!(
                        "context value for '{}' must be a scalar",
                        key
                    )));
                }
                Some(map)
            }
            Some(_) => return Err(ShardError::validation("context must be an object")),
        };

        let request_id = self.request_id.filter(|id| !id.is_empty());

        Ok(ValidatedLog {
            level,
            message: self.message,
            context,
            request_id,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ValidatedLog {
    pub level: Level,
    pub message: String,
    pub context: Option<Map<String, Value>>,
    pub request_id: Option<String>,
}

impl ValidatedLog {
    pub fn into_entry(self, id: String, timestamp: String) -> LogEntry {
        LogEntry {
            id,
            timestamp,
            level: self.level,
            message: self.message,
            context: self.context,
            request_id: self.request_id,
        }
    }
}

/// Stored log entry, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: String,
    pub level: Level,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl sqlx::FromRow<'_, SqliteRow> for LogEntry {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let level: String = row.try_get("level")?;
        let level = level
            .parse::<Level>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "level".to_string(),
                source: Box::new(e),
            })?;

        let context: Option<String> = row.try_get("context")?;
        let context = context
            .map(|raw| serde_json::from_str::<Map<String, Value>>(&raw))
            .transpose()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "context".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            timestamp: row.try_get("timestamp")?,
            level,
            message: row.try_get("message")?,
            context,
            request_id: row.try_get("request_id")?,
        })
    }
}

/// Complete four-counter row for one calendar date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStat {
    pub date: String,
    pub debug: u64,
    pub info: u64,
    pub warn: u64,
    pub error: u64,
}

impl DailyStat {
    /// Zero-valued row for a date with no data
    pub fn empty(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            debug: 0,
            info: 0,
            warn: 0,
            error: 0,
        }
    }

    pub fn count(&self, level: Level) -> u64 {
        match level {
            Level::Debug => self.debug,
            Level::Info => self.info,
            Level::Warn => self.warn,
            Level::Error => self.error,
        }
    }

    pub fn total(&self) -> u64 {
        self.debug + self.info + self.warn + self.error
    }
}

impl sqlx::FromRow<'_, SqliteRow> for DailyStat {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            date: row.try_get("date")?,
            debug: row.try_get::<i64, _>("debug")?.max(0) as u64,
            info: row.try_get::<i64, _>("info")?.max(0) as u64,
            warn: row.try_get::<i64, _>("warn")?.max(0) as u64,
            error: row.try_get::<i64, _>("error")?.max(0) as u64,
        })
    }
}

/// One counter increment request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDelta {
    pub level: Level,
    #[serde(default = "default_delta_count")]
    pub count: u32,
}

impl StatsDelta {
    pub fn new(level: Level, count: u32) -> Self {
        Self { level, count }
    }
}

fn default_delta_count() -> u32 {
    1
}

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckRecord {
    pub id: i64,
    pub url: String,
    /// HTTP status code, or 0 when the probe failed at the transport level
    pub status: u16,
    pub latency_ms: u64,
    pub checked_at: String,
}

impl HealthCheckRecord {
    pub fn is_up(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

impl sqlx::FromRow<'_, SqliteRow> for HealthCheckRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            status: row.try_get::<i64, _>("status")?.clamp(0, u16::MAX as i64) as u16,
            latency_ms: row.try_get::<i64, _>("latency_ms")?.max(0) as u64,
            checked_at: row.try_get("checked_at")?,
        })
    }
}

/// Health scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    NoMonitoring,
    Scheduled,
    Probing,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::NoMonitoring => "no_monitoring",
            SchedulerState::Scheduled => "scheduled",
            SchedulerState::Probing => "probing",
        };
        f.write_str(name)
    }
}

/// Monitored URLs plus the pending probe, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSchedule {
    pub urls: Vec<String>,
    pub state: SchedulerState,
    pub next_probe_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_parsing_is_exact() {
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::Warn);
        assert!("warn".parse::<Level>().is_err());
        assert!("FATAL".parse::<Level>().is_err());
        assert_eq!(
            "".parse::<Level>().unwrap_err(),
            ShardError::validation("level is required")
        );
    }

    #[test]
    fn test_validate_rejects_missing_message() {
        let err = LogInput::new("INFO", "").validate().unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn test_validate_rejects_nested_context() {
        let input = LogInput::new("INFO", "hi").with_context(json!({"user": {"id": 1}}));
        assert!(input.validate().is_err());

        let input = LogInput::new("INFO", "hi").with_context(json!(["a"]));
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_scalar_context() {
        let input = LogInput::new("INFO", "hi")
            .with_context(json!({"user": "u1", "attempt": 2, "retry": true, "note": null}));
        let validated = input.validate().unwrap();
        assert_eq!(validated.context.unwrap().len(), 4);
    }

    #[test]
    fn test_batch_from_value_requires_array() {
        let err = LogInput::batch_from_value(json!({"level": "INFO"})).unwrap_err();
        assert_eq!(err, ShardError::validation("batch payload must be an array"));

        let batch = LogInput::batch_from_value(json!([
            {"level": "INFO", "message": "a"},
            {"level": "ERROR", "message": "b", "request_id": "r1"}
        ]))
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].request_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_stats_delta_defaults_to_one() {
        let delta: StatsDelta = serde_json::from_value(json!({"level": "ERROR"})).unwrap();
        assert_eq!(delta, StatsDelta::new(Level::Error, 1));
    }
}
