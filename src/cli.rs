use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "logshard", version, about = "Per-tenant log storage shards")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "logshard.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format for command results
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Host shards until Ctrl-C: recover pending alarms and run the retention sweep (default)
    Run,

    /// Append log entries to a tenant's shard
    Ingest(crate::commands::ingest::IngestArgs),

    /// Query a tenant's log entries
    Logs(crate::commands::logs::LogsArgs),

    /// Delete old log entries
    Prune(crate::commands::prune::PruneArgs),

    /// Show daily per-level counters
    Stats(crate::commands::stats::StatsArgs),

    /// Manage health monitoring
    Health {
        #[command(subcommand)]
        action: HealthCommands,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum HealthCommands {
    /// Replace the monitored URL list (no URLs stops monitoring)
    SetUrls {
        /// Tenant id
        #[arg(short, long)]
        tenant: String,

        /// Absolute http(s) URLs to probe
        urls: Vec<String>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show monitored URLs and the next scheduled probe
    Status {
        /// Tenant id
        #[arg(short, long)]
        tenant: String,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show recent probe results, newest first
    History {
        /// Tenant id
        #[arg(short, long)]
        tenant: String,

        /// Only results for this URL
        #[arg(short, long)]
        url: Option<String>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<u32>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display the effective configuration
    Show,

    /// Validate configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Run if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}
