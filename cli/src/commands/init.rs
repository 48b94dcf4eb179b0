//! Init Command - Write a default configuration

use std::fs;
use std::path::Path;

use clap::Args;
use tracing::info;

use crate::config::{default_config_path, CliConfig};

/// Initialize a data directory
#[derive(Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    force: bool,
}

impl InitCommand {
    pub async fn execute(self, data_dir: &Path) -> anyhow::Result<()> {
        let config_path = default_config_path(data_dir);

        info!("Data directory: {}", data_dir.display());

        if config_path.exists() && !self.force {
            anyhow::bail!(
                "Already initialized at {}. Use --force to overwrite.",
                data_dir.display()
            );
        }

        fs::create_dir_all(data_dir)?;

        let config = CliConfig::default();
        config.save(&config_path)?;

        info!("Configuration saved to {}", config_path.display());

        println!();
        println!("✅ CipherPulse initialized");
        println!();
        println!("Configuration:  {}", config_path.display());
        println!("Authorizations: {}", config.authorization_db(data_dir).display());
        println!();
        println!("Deployments:");
        for deployment in &config.deployments {
            let address = if deployment.address.is_zero() {
                "(not deployed)".to_string()
            } else {
                deployment.address.to_string()
            };
            println!(
                "  {:<10} chainId={:<10} {}",
                deployment.chain_name, deployment.chain_id, address
            );
        }
        println!();
        println!("To run a simulated session:");
        println!("  cipherpulse demo --data-dir {}", data_dir.display());

        Ok(())
    }
}
