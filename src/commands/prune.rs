//! Prune command
//!
//! Deletes entries older than a watermark from one tenant, or runs the
//! retention sweep over every shard on disk.

use crate::cli::OutputFormat;
use crate::commands::{emit, with_shard};
use anyhow::{bail, Result};
use clap::Parser;
use colored::Colorize;
use logshard::cleanup;
use logshard::config::Config;
use logshard::host::ShardHost;
use serde_json::json;

/// Delete old log entries
#[derive(Debug, Clone, Parser)]
pub struct PruneArgs {
    /// Tenant id
    #[arg(short, long, conflicts_with = "all")]
    pub tenant: Option<String>,

    /// Delete entries strictly older than this instant (RFC 3339 or YYYY-MM-DD)
    #[arg(short, long, requires = "tenant")]
    pub before: Option<String>,

    /// Prune every shard on disk
    #[arg(long)]
    pub all: bool,

    /// With --all: keep this many days (defaults to retention.max_age_days)
    #[arg(long, requires = "all")]
    pub max_age_days: Option<u32>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

pub async fn execute(cfg: Config, args: PruneArgs) -> Result<()> {
    if args.all {
        return prune_all(&cfg, &args).await;
    }

    let (Some(tenant), Some(before)) = (&args.tenant, &args.before) else {
        bail!("either --tenant with --before, or --all is required");
    };

    let before = before.clone();
    let result = with_shard(&cfg, tenant, |shard| async move { shard.prune_logs(before).await }).await;

    emit(args.format, result, |deleted| {
        println!("{} {} log entries", "Deleted".green().bold(), deleted);
    })
}

async fn prune_all(cfg: &Config, args: &PruneArgs) -> Result<()> {
    let max_age_days = args.max_age_days.unwrap_or(cfg.retention.max_age_days);
    if max_age_days == 0 && args.max_age_days.is_none() {
        bail!("retention.max_age_days is 0; pass --max-age-days to prune anyway");
    }

    let host = ShardHost::from_config(cfg);
    let stats = cleanup::run_retention_now(&host, max_age_days).await;
    host.shutdown().await;

    match args.format {
        OutputFormat::Json => {
            let body = json!({
                "success": stats.shards_failed == 0,
                "data": {
                    "shards_pruned": stats.shards_pruned,
                    "shards_failed": stats.shards_failed,
                    "logs_deleted": stats.logs_deleted,
                }
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            println!(
                "{} {} log entries from {} shard(s)",
                "Deleted".green().bold(),
                stats.logs_deleted,
                stats.shards_pruned
            );
            if stats.shards_failed > 0 {
                eprintln!("{}", format!("{} shard(s) failed, see logs", stats.shards_failed).red());
            }
        }
    }

    if stats.shards_failed > 0 {
        bail!("{} shard(s) failed to prune", stats.shards_failed);
    }
    Ok(())
}
