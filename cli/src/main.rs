//! CipherPulse CLI
//!
//! Command-line interface for encrypted health sessions.
//!
//! # Usage
//!
//! ```bash
//! # Write a default configuration
//! cipherpulse init
//!
//! # Run a full session against the simulated ledger
//! cipherpulse demo --records 5
//!
//! # Show stale results being discarded after an account switch
//! cipherpulse demo --switch-account
//!
//! # Inspect or clear persisted decryption authorizations
//! cipherpulse auth list
//! cipherpulse auth clear
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod logging;

use commands::{AuthCommand, DemoCommand, InitCommand};
use config::{default_config_path, default_data_dir, CliConfig};

/// CipherPulse encrypted health sessions
#[derive(Parser)]
#[command(name = "cipherpulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Client-side encrypted health state synchronization", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(short, long, global = true, env = "CIPHERPULSE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration
    Init(InitCommand),

    /// Persisted decryption authorizations
    Auth(AuthCommand),

    /// Run a session against simulated collaborators
    Demo(DemoCommand),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::load_or_default(&default_config_path(&data_dir))?,
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    logging::init(level, cli.json_logs || config.logging.format == "json")?;

    match cli.command {
        Commands::Init(cmd) => cmd.execute(&data_dir).await,
        Commands::Auth(cmd) => cmd.execute(&config, &data_dir).await,
        Commands::Demo(cmd) => cmd.execute(&config, &data_dir).await,
        Commands::Version => {
            println!("cipherpulse {}", env!("CARGO_PKG_VERSION"));
            println!("Authorization validity: {} days", config.session.authorization_duration_days);
            Ok(())
        }
    }
}
