//! Command implementations for the CLI
//!
//! - run: host shards, recover alarms, run the retention sweep
//! - ingest / logs / prune / stats: one-shot calls against a tenant shard
//! - health: monitored URLs, status and probe history
//! - config: configuration display and validation

pub mod config;
pub mod health;
pub mod ingest;
pub mod logs;
pub mod prune;
pub mod run;
pub mod stats;

use crate::cli::OutputFormat;
use anyhow::Result;
use colored::Colorize;
use logshard::config::Config;
use logshard::error::{Outcome, ShardResult};
use logshard::host::ShardHost;
use logshard::shard::ShardHandle;
use serde::Serialize;
use std::future::Future;

/// Run `op` against one tenant's shard, then stop the host cleanly
pub async fn with_shard<T, F, Fut>(cfg: &Config, tenant: &str, op: F) -> ShardResult<T>
where
    F: FnOnce(ShardHandle) -> Fut,
    Fut: Future<Output = ShardResult<T>>,
{
    let host = ShardHost::from_config(cfg);

    let result = match host.shard(tenant).await {
        Ok(handle) => op(handle).await,
        Err(e) => Err(e),
    };

    host.shutdown().await;
    result
}

/// Print a shard result as text or as the tagged JSON outcome
///
/// A failed result also fails the command so the exit status is non-zero.
pub fn emit<T: Serialize>(format: OutputFormat, result: ShardResult<T>, text: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let failed = result.as_ref().err().cloned();
            let outcome: Outcome<T> = result.into();
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            match failed {
                Some(e) => Err(e.into()),
                None => Ok(()),
            }
        }
        OutputFormat::Text => match result {
            Ok(data) => {
                text(&data);
                Ok(())
            }
            Err(e) => {
                eprintln!("{} {}", format!("[{}]", e.code()).red().bold(), e.message());
                Err(e.into())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logshard::shard::LogInput;

    #[tokio::test]
    async fn test_one_shot_refused_while_tenant_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.storage.data_dir = dir.path().to_path_buf();

        let server = ShardHost::from_config(&cfg);
        server.shard("acme").await.unwrap();

        let err = with_shard(&cfg, "acme", |shard| async move { shard.log(LogInput::new("INFO", "hi")).await })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "shard_unavailable");

        server.shutdown().await;
        let stored = with_shard(&cfg, "acme", |shard| async move { shard.log(LogInput::new("INFO", "hi")).await })
            .await
            .unwrap();
        assert_eq!(stored.message, "hi");
    }
}
