use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use logshard::config;
use logshard::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();

    let cfg = config::load_config(&args.config)?;
    init_tracing(&cfg.log_level, &cfg.log_format);

    // Dispatch to appropriate command handler
    match args.get_command() {
        cli::Commands::Run => commands::run::execute(cfg).await?,
        cli::Commands::Ingest(ingest) => commands::ingest::execute(cfg, ingest).await?,
        cli::Commands::Logs(logs) => commands::logs::execute(cfg, logs).await?,
        cli::Commands::Prune(prune) => commands::prune::execute(cfg, prune).await?,
        cli::Commands::Stats(stats) => commands::stats::execute(cfg, stats).await?,
        cli::Commands::Health { action } => commands::health::execute(cfg, action).await?,
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&cfg)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config, &cfg),
        },
    }

    Ok(())
}
