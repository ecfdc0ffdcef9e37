//! Health monitoring commands
//!
//! Probes only run while a `run` host is alive; `set-urls` persists the list
//! and the first alarm, which the host recovers on start.

use crate::cli::HealthCommands;
use crate::commands::{emit, with_shard};
use anyhow::Result;
use colored::Colorize;
use logshard::config::Config;
use logshard::shard::{HealthCheckRecord, HealthSchedule};

pub async fn execute(cfg: Config, action: HealthCommands) -> Result<()> {
    match action {
        HealthCommands::SetUrls { tenant, urls, format } => {
            let result =
                with_shard(&cfg, &tenant, |shard| async move { shard.set_health_urls(urls).await }).await;
            emit(format, result, display_schedule)
        }
        HealthCommands::Status { tenant, format } => {
            let result = with_shard(&cfg, &tenant, |shard| async move { shard.health_status().await }).await;
            emit(format, result, display_schedule)
        }
        HealthCommands::History {
            tenant,
            url,
            limit,
            format,
        } => {
            let result = with_shard(&cfg, &tenant, |shard| async move {
                shard.get_health_history(url, limit).await
            })
            .await;
            emit(format, result, |records| display_history(records))
        }
    }
}

fn display_schedule(schedule: &HealthSchedule) {
    println!("{} {}", "State:".bold(), schedule.state);
    match &schedule.next_probe_at {
        Some(at) => println!("{} {}", "Next probe:".bold(), at),
        None => println!("{} {}", "Next probe:".bold(), "none".dimmed()),
    }

    if schedule.urls.is_empty() {
        println!("{}", "No URLs monitored".yellow());
    } else {
        println!("{}", "Monitored URLs:".bold());
        for url in &schedule.urls {
            println!("  {}", url.cyan());
        }
    }
}

fn display_history(records: &[HealthCheckRecord]) {
    if records.is_empty() {
        println!("{}", "No health checks recorded".yellow());
        return;
    }

    for record in records {
        let status = if record.status == 0 {
            "DOWN".red().bold()
        } else if record.is_up() {
            record.status.to_string().green()
        } else {
            record.status.to_string().red()
        };

        println!(
            "{} {} {:>6}ms {}",
            record.checked_at.dimmed(),
            status,
            record.latency_ms,
            record.url.cyan()
        );
    }
}
