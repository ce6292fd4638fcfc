use anyhow::Result;
use colored::Colorize;
use tracing::info;
use tracking_server::{config, init_tracing, server};

/// Execute the start command
///
/// Loads configuration, sets up logging from it and serves until a shutdown
/// signal arrives.
pub async fn execute(config_path: Option<&str>) -> Result<()> {
    println!("{}", "Starting tracking server...".green());

    let cfg = config::load_config(config_path)?;
    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    info!(
        host = %cfg.server.host,
        port = cfg.server.port,
        "Starting tracking server"
    );

    // Blocks until shutdown
    server::start_server(cfg).await?;

    Ok(())
}
