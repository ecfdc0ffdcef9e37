//! Ingest command
//!
//! Appends one entry (from flags) or a batch (JSON array from a file or
//! stdin) and bumps the daily counters the way the router does.

use crate::cli::OutputFormat;
use crate::commands::{emit, logs::display_entries, with_shard};
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use logshard::config::Config;
use logshard::error::ShardResult;
use logshard::shard::{LogEntry, LogInput, ShardHandle, StatsDelta};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Append log entries
#[derive(Debug, Clone, Parser)]
pub struct IngestArgs {
    /// Tenant id
    #[arg(short, long)]
    pub tenant: String,

    /// Log level (DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, required_unless_present = "file")]
    pub level: Option<String>,

    /// Log message
    #[arg(short, long, required_unless_present = "file")]
    pub message: Option<String>,

    /// Structured context as a JSON object
    #[arg(long)]
    pub context: Option<String>,

    /// Request id to correlate entries
    #[arg(short, long)]
    pub request_id: Option<String>,

    /// JSON array of entries to insert as one batch ("-" reads stdin)
    #[arg(long, conflicts_with_all = ["level", "message", "context", "request_id"])]
    pub file: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

pub async fn execute(cfg: Config, args: IngestArgs) -> Result<()> {
    let payload = match &args.file {
        Some(path) => Payload::Batch(read_batch(path)?),
        None => Payload::Single(single_input(&args)?),
    };

    let result = with_shard(&cfg, &args.tenant, |shard| ingest(shard, payload)).await;

    emit(args.format, result, |entries| {
        println!("{}", format!("Stored {} log entries", entries.len()).green().bold());
        display_entries(entries);
    })
}

enum Payload {
    Single(LogInput),
    Batch(serde_json::Value),
}

async fn ingest(shard: ShardHandle, payload: Payload) -> ShardResult<Vec<LogEntry>> {
    let entries = match payload {
        Payload::Single(input) => vec![shard.log(input).await?],
        Payload::Batch(value) => shard.log_batch(LogInput::batch_from_value(value)?).await?,
    };

    let deltas = level_deltas(&entries);
    if !deltas.is_empty() {
        shard.record_stats_batch(deltas).await?;
    }

    Ok(entries)
}

/// One counter delta per level present in `entries`
fn level_deltas(entries: &[LogEntry]) -> Vec<StatsDelta> {
    let mut counts: BTreeMap<&'static str, StatsDelta> = BTreeMap::new();
    for entry in entries {
        counts
            .entry(entry.level.as_str())
            .or_insert_with(|| StatsDelta::new(entry.level, 0))
            .count += 1;
    }
    counts.into_values().collect()
}

fn single_input(args: &IngestArgs) -> Result<LogInput> {
    let mut input = LogInput::new(
        args.level.clone().unwrap_or_default(),
        args.message.clone().unwrap_or_default(),
    );

    if let Some(raw) = &args.context {
        let context = serde_json::from_str(raw).context("--context must be valid JSON")?;
        input = input.with_context(context);
    }
    if let Some(request_id) = &args.request_id {
        input = input.with_request_id(request_id.clone());
    }

    Ok(input)
}

fn read_batch(path: &Path) -> Result<serde_json::Value> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };

    serde_json::from_str(&raw).context("batch file must contain JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use logshard::shard::Level;

    fn entry(level: Level) -> LogEntry {
        LogEntry {
            id: "id".to_string(),
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
            level,
            message: "m".to_string(),
            context: None,
            request_id: None,
        }
    }

    #[test]
    fn test_level_deltas_groups_by_level() {
        let entries = vec![entry(Level::Info), entry(Level::Error), entry(Level::Info)];
        let deltas = level_deltas(&entries);

        assert_eq!(deltas.len(), 2);
        assert!(deltas.contains(&StatsDelta::new(Level::Info, 2)));
        assert!(deltas.contains(&StatsDelta::new(Level::Error, 1)));
    }
}
