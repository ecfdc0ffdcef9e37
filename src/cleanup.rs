//! Background retention sweep
//!
//! Once a day at `cleanup_hour` (UTC) every shard on disk is pruned to
//! `max_age_days`. Daily counters are never touched.

use crate::config::RetentionConfig;
use crate::host::ShardHost;
use crate::shard::clock;
use chrono::{Datelike, Timelike, Utc};
use std::time::Duration;
use tokio::time;

/// How often the loop checks whether it is cleanup time
const CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionStats {
    pub shards_pruned: usize,
    pub shards_failed: usize,
    pub logs_deleted: u64,
}

/// Spawn the sweep; returns `None` when retention is disabled
pub fn spawn_retention_task(host: ShardHost, config: RetentionConfig) -> Option<tokio::task::JoinHandle<()>> {
    if config.max_age_days == 0 {
        tracing::debug!("Log retention disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        retention_loop(host, config).await;
    }))
}

async fn retention_loop(host: ShardHost, config: RetentionConfig) {
    let mut interval = time::interval(CHECK_INTERVAL);
    let mut last_sweep_day: Option<u32> = None;

    loop {
        interval.tick().await;

        let now = Utc::now();
        let current_day = now.ordinal();

        if now.hour() == u32::from(config.cleanup_hour) && Some(current_day) != last_sweep_day {
            tracing::info!(
                cleanup_hour = config.cleanup_hour,
                max_age_days = config.max_age_days,
                "Starting scheduled retention sweep"
            );

            let stats = run_retention_now(&host, config.max_age_days).await;
            if stats.shards_failed == 0 {
                last_sweep_day = Some(current_day);
            }
        }
    }
}

/// Prune every shard on disk to `max_age_days` immediately
///
/// Shards that were not live before the sweep are evicted again afterwards.
pub async fn run_retention_now(host: &ShardHost, max_age_days: u32) -> RetentionStats {
    let watermark = clock::format_timestamp(Utc::now() - chrono::Duration::days(i64::from(max_age_days)));
    let mut stats = RetentionStats::default();

    let tenants = match host.tenant_ids_on_disk().await {
        Ok(tenants) => tenants,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list shards for retention");
            return stats;
        }
    };
    let active = host.active_tenants();

    for tenant in tenants {
        let result = match host.shard(&tenant).await {
            Ok(handle) => handle.prune_logs(watermark.clone()).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(deleted) => {
                stats.shards_pruned += 1;
                stats.logs_deleted += deleted;
            }
            Err(e) => {
                stats.shards_failed += 1;
                tracing::error!(tenant = %tenant, error = %e, "Retention prune failed");
            }
        }

        if !active.contains(&tenant) {
            if let Err(e) = host.evict(&tenant).await {
                tracing::warn!(tenant = %tenant, error = %e, "Failed to evict shard after retention");
            }
        }
    }

    tracing::info!(
        shards_pruned = stats.shards_pruned,
        shards_failed = stats.shards_failed,
        logs_deleted = stats.logs_deleted,
        watermark = %watermark,
        "Retention sweep completed"
    );

    stats
}
