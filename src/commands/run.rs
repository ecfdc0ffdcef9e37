//! Long-running shard host
//!
//! Recovers persisted health alarms from every shard on disk, starts the
//! retention sweep and then keeps the process alive so alarms can fire.

use anyhow::Result;
use colored::Colorize;
use logshard::cleanup;
use logshard::config::Config;
use logshard::host::ShardHost;
use tracing::info;

pub async fn execute(cfg: Config) -> Result<()> {
    let host = ShardHost::from_config(&cfg);

    info!(data_dir = %cfg.storage.data_dir.display(), "Starting shard host");

    let recovered = host.recover().await?;
    println!(
        "{} {} shard(s) with pending health checks",
        "Recovered".green().bold(),
        recovered.len()
    );

    let sweep = cleanup::spawn_retention_task(host.clone(), cfg.retention.clone());
    if sweep.is_some() {
        info!(
            max_age_days = cfg.retention.max_age_days,
            cleanup_hour = cfg.retention.cleanup_hour,
            "Retention sweep enabled"
        );
    }

    wait_for_shutdown().await?;

    info!("Shutdown signal received, stopping shards");
    if let Some(sweep) = sweep {
        sweep.abort();
    }
    host.shutdown().await;

    println!("{}", "Shard host stopped".green());
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
