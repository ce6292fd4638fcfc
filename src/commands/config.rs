use anyhow::Result;
use colored::Colorize;
use tracing::info;
use tracking_server::config;

/// Execute the config show command
///
/// Prints the effective configuration (file plus environment) as TOML
pub fn show(config_path: Option<&str>) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!("Loading configuration for display");

    let cfg = config::load_config(config_path)?;

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&cfg)?;
    println!("{}", toml_string);

    info!("Configuration displayed successfully");
    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: Option<&str>) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!("Validating configuration file");

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Listen: {}:{}", cfg.server.host, cfg.server.port);
    println!("  Database: {}", cfg.store.database_url);
    println!("  Tracking URI: {}", cfg.client.tracking_uri);

    info!("Configuration validation successful");
    Ok(())
}
