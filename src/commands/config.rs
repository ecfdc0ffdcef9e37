use anyhow::Result;
use colored::Colorize;
use logshard::config::Config;
use std::path::Path;
use tracing::info;

/// Execute the config show command
///
/// Displays the effective configuration (file, environment and defaults merged)
pub fn show(cfg: &Config) -> Result<()> {
    println!("{}", "Current Configuration:".green().bold());
    println!();

    // Serialize to TOML format
    let toml_string = toml::to_string_pretty(cfg)?;
    println!("{}", toml_string);

    info!("Configuration displayed successfully");
    Ok(())
}

/// Execute the config validate command
///
/// Loading already validated the values; this reports where they came from.
pub fn validate(path: &Path, cfg: &Config) {
    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());

    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", path.display())
    };
    println!("  Config file: {}", source);
    println!("  Data dir: {}", cfg.storage.data_dir.display());
    println!(
        "  Health probes: every {}s, first after {}s, timeout {}s",
        cfg.health.interval_secs, cfg.health.initial_delay_secs, cfg.health.probe_timeout_secs
    );
    match cfg.retention.max_age_days {
        0 => println!("  Retention: {}", "disabled".dimmed()),
        days => println!(
            "  Retention: {} days, swept at {:02}:00 UTC",
            days, cfg.retention.cleanup_hour
        ),
    }
}
