//! CipherPulse Storage Layer
//!
//! Persists decryption authorizations across sessions so a user signs once
//! per validity window instead of once per process.
//!
//! # Architecture
//!
//! The storage layer uses redb (an embedded database) for:
//! - Authorization records keyed by `(contract set, user)` fingerprint
//! - bincode-encoded record values

pub mod authorizations;
mod error;

pub use authorizations::AuthorizationStore;
pub use error::{StorageError, StorageResult};

use cipherpulse_sync::authorization::{AuthorizationStorage, DecryptionAuthorization, Fingerprint};
use cipherpulse_sync::SyncResult;
use redb::Database;
use std::path::Path;
use std::sync::Arc;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Database path
    pub path: std::path::PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: std::path::PathBuf::from("./cipherpulse_data/authorizations.redb"),
        }
    }
}

/// Main storage interface
pub struct Storage {
    db: Arc<Database>,
    config: StorageConfig,
    pub authorizations: AuthorizationStore,
}

impl Storage {
    /// Open or create storage at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let config = StorageConfig {
            path: path.as_ref().to_path_buf(),
        };
        Self::with_config(config)
    }

    /// Open storage with custom configuration
    pub fn with_config(config: StorageConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Arc::new(Database::create(&config.path)?);
        let authorizations = AuthorizationStore::new(db.clone())?;

        Ok(Self {
            db,
            config,
            authorizations,
        })
    }

    /// Get storage configuration
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Shared handle to the underlying database
    pub fn database(&self) -> Arc<Database> {
        self.db.clone()
    }

    /// Get database statistics
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            path: self.config.path.clone(),
            authorization_count: self.authorizations.count().unwrap_or(0),
        }
    }
}

impl AuthorizationStorage for Storage {
    fn get(&self, fingerprint: &Fingerprint) -> SyncResult<Option<DecryptionAuthorization>> {
        self.authorizations.get(fingerprint)
    }

    fn put(&self, fingerprint: &Fingerprint, record: &DecryptionAuthorization) -> SyncResult<()> {
        self.authorizations.put(fingerprint, record)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub path: std::path::PathBuf,
    pub authorization_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_storage_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("test.redb");

        let storage = Storage::open(&path).unwrap();
        let stats = storage.stats();

        assert_eq!(stats.authorization_count, 0);
        assert_eq!(stats.path, path);
    }

    #[test]
    fn test_reopen_keeps_records() {
        use cipherpulse_sync::{Address, EphemeralKeypair};

        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");
        let record = DecryptionAuthorization {
            keypair: EphemeralKeypair {
                public_key: "pk".into(),
                private_key: "sk".into(),
            },
            signature: vec![7u8; 32],
            contract_addresses: vec![Address::new([1u8; 20])],
            user_address: Address::new([2u8; 20]),
            start_timestamp: 1_700_000_000,
            duration_days: 30,
        };
        let fp = Fingerprint::compute(&record.contract_addresses, &record.user_address);

        {
            let storage = Storage::open(&path).unwrap();
            storage.put(&fp, &record).unwrap();
        }

        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.get(&fp).unwrap(), Some(record));
    }

    #[test]
    fn test_storage_config() {
        let config = StorageConfig::default();
        assert!(config.path.ends_with("authorizations.redb"));
    }
}
