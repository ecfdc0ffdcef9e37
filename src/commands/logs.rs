//! Logs query command
//!
//! Query and display a tenant's log entries, newest first.

use crate::cli::OutputFormat;
use crate::commands::{emit, with_shard};
use anyhow::{bail, Result};
use clap::Parser;
use colored::Colorize;
use logshard::config::Config;
use logshard::shard::{Level, LogEntry, LogQuery};

/// Query and display logs
#[derive(Debug, Clone, Parser)]
pub struct LogsArgs {
    /// Tenant id
    #[arg(short, long)]
    pub tenant: String,

    /// Filter by log level (DEBUG, INFO, WARN, ERROR)
    #[arg(short, long)]
    pub level: Option<String>,

    /// Only entries at or after this instant (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,

    /// Only entries at or before this instant (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<String>,

    /// Filter by request ID
    #[arg(short, long)]
    pub request_id: Option<String>,

    /// Case-sensitive substring of the message
    #[arg(short, long)]
    pub search: Option<String>,

    /// Context field filter as key=value (repeatable)
    #[arg(long)]
    pub context: Vec<String>,

    /// Maximum number of results (defaults to query.default_limit)
    #[arg(long)]
    pub limit: Option<u32>,

    /// Number of matching entries to skip
    #[arg(long, default_value = "0")]
    pub offset: u32,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

impl LogsArgs {
    fn to_query(&self, default_limit: u32) -> Result<LogQuery> {
        let mut query = LogQuery::default()
            .limit(self.limit.unwrap_or(default_limit))
            .offset(self.offset);

        if let Some(level) = &self.level {
            query = query.level(level.clone());
        }
        if let Some(since) = &self.since {
            query = query.since(since.clone());
        }
        if let Some(until) = &self.until {
            query = query.until(until.clone());
        }
        if let Some(request_id) = &self.request_id {
            query = query.request_id(request_id.clone());
        }
        if let Some(search) = &self.search {
            query = query.search(search.clone());
        }
        for pair in &self.context {
            let Some((key, value)) = pair.split_once('=') else {
                bail!("--context expects key=value, got '{}'", pair);
            };
            query = query.context(key, value);
        }

        Ok(query)
    }
}

/// Execute the logs command
pub async fn execute(cfg: Config, args: LogsArgs) -> Result<()> {
    let query = args.to_query(cfg.query.default_limit)?;

    let result = with_shard(&cfg, &args.tenant, |shard| async move { shard.query(query).await }).await;

    emit(args.format, result, |entries| {
        if entries.is_empty() {
            println!("{}", "No logs found matching the criteria".yellow());
            return;
        }
        println!("{}", format!("Found {} log entries", entries.len()).bold());
        println!();
        display_entries(entries);
    })
}

/// Display entries in human-friendly text format
pub fn display_entries(entries: &[LogEntry]) {
    for entry in entries {
        let level = match entry.level {
            Level::Error => entry.level.as_str().red().bold(),
            Level::Warn => entry.level.as_str().yellow().bold(),
            Level::Info => entry.level.as_str().green(),
            Level::Debug => entry.level.as_str().blue(),
        };

        let request_id = entry
            .request_id
            .as_ref()
            .map(|id| format!(" req={}", id))
            .unwrap_or_default();

        println!(
            "{} {}{} {}",
            entry.timestamp.dimmed(),
            level,
            request_id.dimmed(),
            entry.message
        );

        if let Some(context) = entry.context.as_ref().filter(|c| !c.is_empty()) {
            let fields = serde_json::Value::Object(context.clone());
            println!("  {}", format!("context: {}", fields).dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> LogsArgs {
        LogsArgs {
            tenant: "acme".to_string(),
            level: None,
            since: None,
            until: None,
            request_id: None,
            search: None,
            context: Vec::new(),
            limit: None,
            offset: 0,
            format: OutputFormat::Text,
        }
    }

    #[test]
    fn test_to_query_uses_configured_default_limit() {
        let query = args().to_query(25).unwrap();
        assert_eq!(query.limit, 25);
    }

    #[test]
    fn test_to_query_parses_context_pairs() {
        let mut args = args();
        args.context = vec!["user=u1".to_string(), "expr=a=b".to_string()];

        let query = args.to_query(100).unwrap();
        assert_eq!(
            query.context,
            vec![
                ("user".to_string(), "u1".to_string()),
                ("expr".to_string(), "a=b".to_string())
            ]
        );

        args.context = vec!["novalue".to_string()];
        assert!(args.to_query(100).is_err());
    }
}
