use crate::shard::query::{DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};
use crate::shard::{HealthSettings, StoreOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// One `<tenant>.db` file per tenant lives here
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    #[serde(default = "default_query_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Probe records kept per URL
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
    /// Records returned by history reads without an explicit limit
    #[serde(default = "default_history_page")]
    pub default_history_limit: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Entries older than this are pruned by the daily sweep; 0 disables it
    #[serde(default)]
    pub max_age_days: u32,
    /// Hour of day (UTC, 0-23) the sweep runs
    #[serde(default = "default_cleanup_hour")]
    pub cleanup_hour: u8,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/shards")
}

fn default_busy_timeout_secs() -> u64 {
    30
}

fn default_mailbox_capacity() -> usize {
    256
}

fn default_query_limit() -> u32 {
    DEFAULT_QUERY_LIMIT
}

fn default_max_limit() -> u32 {
    MAX_QUERY_LIMIT
}

fn default_initial_delay_secs() -> u64 {
    60
}

fn default_interval_secs() -> u64 {
    300
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_history_limit() -> u32 {
    crate::shard::health::DEFAULT_HISTORY_LIMIT
}

fn default_history_page() -> u32 {
    crate::shard::health::DEFAULT_HISTORY_PAGE
}

fn default_cleanup_hour() -> u8 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            storage: StorageConfig::default(),
            query: QueryConfig::default(),
            health: HealthConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            busy_timeout_secs: default_busy_timeout_secs(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_query_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            interval_secs: default_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            history_limit: default_history_limit(),
            default_history_limit: default_history_page(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: 0,
            cleanup_hour: default_cleanup_hour(),
        }
    }
}

impl StorageConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_secs(self.busy_timeout_secs),
        }
    }
}

impl HealthConfig {
    pub fn settings(&self) -> HealthSettings {
        HealthSettings {
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            interval: Duration::from_secs(self.interval_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            history_limit: self.history_limit,
        }
    }
}

/// Load configuration from `path` (optional) layered under `LOGSHARD__*`
/// environment variables, e.g. `LOGSHARD__STORAGE__DATA_DIR`
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("LOGSHARD").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if !matches!(cfg.log_format.as_str(), "text" | "json") {
        anyhow::bail!("log_format must be 'text' or 'json', got '{}'", cfg.log_format);
    }

    if cfg.storage.mailbox_capacity == 0 {
        anyhow::bail!("storage.mailbox_capacity must be at least 1");
    }

    if cfg.query.max_limit == 0 {
        anyhow::bail!("query.max_limit must be at least 1");
    }
    if cfg.query.default_limit == 0 || cfg.query.default_limit > cfg.query.max_limit {
        anyhow::bail!(
            "query.default_limit must be between 1 and query.max_limit ({})",
            cfg.query.max_limit
        );
    }

    if cfg.health.interval_secs == 0 {
        anyhow::bail!("health.interval_secs must be at least 1");
    }
    if cfg.health.probe_timeout_secs == 0 {
        anyhow::bail!("health.probe_timeout_secs must be at least 1");
    }
    if cfg.health.history_limit == 0 {
        anyhow::bail!("health.history_limit must be at least 1");
    }

    if cfg.retention.cleanup_hour > 23 {
        anyhow::bail!("retention.cleanup_hour must be 0-23, got {}", cfg.retention.cleanup_hour);
    }

    Ok(())
}
