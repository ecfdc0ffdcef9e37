//! Stats command
//!
//! Shows one day's per-level counters, or a run of recent days.

use crate::cli::OutputFormat;
use crate::commands::{emit, with_shard};
use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use logshard::config::Config;
use logshard::shard::DailyStat;

/// Show daily per-level counters
#[derive(Debug, Clone, Parser)]
pub struct StatsArgs {
    /// Tenant id
    #[arg(short, long)]
    pub tenant: String,

    /// Day to show (YYYY-MM-DD, default today UTC)
    #[arg(short, long, conflicts_with = "days")]
    pub date: Option<String>,

    /// Show the last N days ending today, newest first
    #[arg(long)]
    pub days: Option<u32>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

pub async fn execute(cfg: Config, args: StatsArgs) -> Result<()> {
    match args.days {
        Some(days) => {
            let result =
                with_shard(&cfg, &args.tenant, |shard| async move { shard.get_stats_range(days).await }).await;
            emit(args.format, result, |stats| display_stats(stats))
        }
        None => {
            let date = args.date.clone();
            let result = with_shard(&cfg, &args.tenant, |shard| async move { shard.get_stats(date).await }).await;
            emit(args.format, result, |stat| display_stats(std::slice::from_ref(stat)))
        }
    }
}

fn display_stats(stats: &[DailyStat]) {
    if stats.is_empty() {
        println!("{}", "No days requested".yellow());
        return;
    }

    println!(
        "{}",
        format!("{:<12} {:>8} {:>8} {:>8} {:>8} {:>9}", "DATE", "DEBUG", "INFO", "WARN", "ERROR", "TOTAL").bold()
    );
    for stat in stats {
        let error = format!("{:>8}", stat.error);
        println!(
            "{:<12} {:>8} {:>8} {:>8} {} {:>9}",
            stat.date,
            stat.debug,
            stat.info,
            stat.warn,
            if stat.error > 0 { error.red() } else { error.normal() },
            stat.total()
        );
    }
}
