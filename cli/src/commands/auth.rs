//! Auth Command - Inspect persisted decryption authorizations

use std::path::Path;

use cipherpulse_storage::Storage;
use cipherpulse_sync::{Clock, SystemClock};
use clap::{Args, Subcommand};
use tracing::info;

use crate::config::CliConfig;

/// Decryption authorization operations
#[derive(Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    action: AuthAction,
}

#[derive(Subcommand)]
enum AuthAction {
    /// List stored authorizations
    List,

    /// Delete every stored authorization
    Clear,
}

impl AuthCommand {
    pub async fn execute(self, config: &CliConfig, data_dir: &Path) -> anyhow::Result<()> {
        let path = config.authorization_db(data_dir);
        if !path.exists() {
            println!("No authorizations stored at {}", path.display());
            return Ok(());
        }

        let storage = Storage::open(&path)?;
        match self.action {
            AuthAction::List => list_authorizations(&storage, SystemClock.now_secs()),
            AuthAction::Clear => clear_authorizations(&storage),
        }
    }
}

fn list_authorizations(storage: &Storage, now: u64) -> anyhow::Result<()> {
    let records = storage.authorizations.list()?;
    if records.is_empty() {
        println!("No authorizations stored");
        return Ok(());
    }

    println!("Authorizations ({}):", records.len());
    for (fingerprint, record) in records {
        let state = if record.is_valid_at(now) {
            "valid"
        } else {
            "expired"
        };
        println!();
        println!("  Fingerprint: {}", fingerprint);
        println!("  User:        {}", record.user_address);
        for contract in &record.contract_addresses {
            println!("  Contract:    {}", contract);
        }
        println!(
            "  Window:      {} .. {} ({})",
            record.start_timestamp,
            record.expires_at(),
            state
        );
    }

    Ok(())
}

fn clear_authorizations(storage: &Storage) -> anyhow::Result<()> {
    let removed = storage.authorizations.clear()?;
    info!(removed, "authorizations cleared");
    println!("Removed {} authorization(s)", removed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherpulse_sync::{
        Address, AuthorizationStorage, DecryptionAuthorization, EphemeralKeypair, Fingerprint,
    };
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_clear_removes_records() {
        let dir = tempdir().unwrap();
        let config = CliConfig::default();
        let path = config.authorization_db(dir.path());

        {
            let storage = Storage::open(&path).unwrap();
            let record = DecryptionAuthorization {
                keypair: EphemeralKeypair {
                    public_key: "pk".into(),
                    private_key: "sk".into(),
                },
                signature: vec![1u8; 32],
                contract_addresses: vec![Address::new([3u8; 20])],
                user_address: Address::new([4u8; 20]),
                start_timestamp: 0,
                duration_days: 1,
            };
            let fp = Fingerprint::compute(&record.contract_addresses, &record.user_address);
            storage.put(&fp, &record).unwrap();
            list_authorizations(&storage, 10).unwrap();
        }

        AuthCommand {
            action: AuthAction::Clear,
        }
        .execute(&config, dir.path())
        .await
        .unwrap();

        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.authorizations.count().unwrap(), 0);
    }
}
