use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use tracking_server::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let config_path = args.config_path();
    let command = args.get_command();

    // The server initializes tracing from its own config
    if !matches!(command, cli::Commands::Start) {
        init_tracing("warn", "text");
    }

    match command {
        cli::Commands::Start => {
            commands::start::execute(config_path.as_deref()).await?;
        }
        cli::Commands::Test => {
            commands::test::execute(config_path.as_deref()).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(config_path.as_deref())?,
            cli::ConfigCommands::Validate => commands::config::validate(config_path.as_deref())?,
        },
        cli::Commands::Version => {
            println!("Tracking Server v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
