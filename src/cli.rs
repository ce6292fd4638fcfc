use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tracking-server", version, about = "Experiment tracking server")]
pub struct Cli {
    /// Configuration file path (defaults to ./tracking.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the tracking server (default)
    Start,

    /// Test configuration file validity and store setup
    Test,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display the effective configuration
    Show,

    /// Validate configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }

    /// Config path as passed to [`tracking_server::config::load_config`]
    pub fn config_path(&self) -> Option<String> {
        self.config
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned())
    }
}
