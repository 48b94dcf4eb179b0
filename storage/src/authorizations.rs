//! Persistent decryption authorizations, keyed by fingerprint

use crate::{StorageError, StorageResult};
use cipherpulse_sync::authorization::{AuthorizationStorage, DecryptionAuthorization, Fingerprint};
use cipherpulse_sync::SyncResult;
use redb::{Database, ReadableTable, TableDefinition};
use std::sync::Arc;
use tracing::debug;

/// Table of authorization records by fingerprint
const AUTHORIZATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("authorizations");

/// Authorization store interface
pub struct AuthorizationStore {
    db: Arc<Database>,
}

impl AuthorizationStore {
    /// Create new authorization store
    pub fn new(db: Arc<Database>) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(AUTHORIZATIONS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Insert or replace the record for `fingerprint`
    pub fn save(
        &self,
        fingerprint: &Fingerprint,
        record: &DecryptionAuthorization,
    ) -> StorageResult<()> {
        let encoded = bincode::serialize(record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUTHORIZATIONS)?;
            table.insert(fingerprint.as_str(), encoded.as_slice())?;
        }
        write_txn.commit()?;

        debug!(%fingerprint, "authorization persisted");
        Ok(())
    }

    /// Get the record for `fingerprint`
    pub fn load(&self, fingerprint: &Fingerprint) -> StorageResult<Option<DecryptionAuthorization>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUTHORIZATIONS)?;

        let result = match table.get(fingerprint.as_str())? {
            Some(data) => {
                let bytes = data.value().to_vec();
                Some(bincode::deserialize(&bytes)?)
            }
            None => None,
        };

        Ok(result)
    }

    /// All stored records, ordered by fingerprint
    pub fn list(&self) -> StorageResult<Vec<(Fingerprint, DecryptionAuthorization)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUTHORIZATIONS)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let record: DecryptionAuthorization = bincode::deserialize(value.value())?;
            records.push((Fingerprint::from_hex(key.value()), record));
        }
        Ok(records)
    }

    /// Delete the record for `fingerprint`; returns whether one existed
    pub fn remove(&self, fingerprint: &Fingerprint) -> StorageResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(AUTHORIZATIONS)?;
            let removed = table.remove(fingerprint.as_str())?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// Delete every record; returns how many were removed
    pub fn clear(&self) -> StorageResult<usize> {
        let keys: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(AUTHORIZATIONS)?;
            let mut keys = Vec::new();
            for entry in table.iter()? {
                let (key, _) = entry?;
                keys.push(key.value().to_string());
            }
            keys
        };

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUTHORIZATIONS)?;
            for key in &keys {
                table.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(keys.len())
    }

    /// Get record count
    pub fn count(&self) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUTHORIZATIONS)?;
        let len = table.len()?;
        Ok(len)
    }

    /// Check that every record is stored under the fingerprint of its scope
    pub fn verify(&self) -> StorageResult<()> {
        for (fingerprint, record) in self.list()? {
            let expected = Fingerprint::compute(&record.contract_addresses, &record.user_address);
            if expected != fingerprint {
                return Err(StorageError::Corruption(format!(
                    "authorization stored under {} belongs to {}",
                    fingerprint, expected
                )));
            }
        }
        Ok(())
    }
}

impl AuthorizationStorage for AuthorizationStore {
    fn get(&self, fingerprint: &Fingerprint) -> SyncResult<Option<DecryptionAuthorization>> {
        Ok(self.load(fingerprint)?)
    }

    fn put(&self, fingerprint: &Fingerprint, record: &DecryptionAuthorization) -> SyncResult<()> {
        Ok(self.save(fingerprint, record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherpulse_sync::{Address, EphemeralKeypair};
    use tempfile::tempdir;

    fn record(user: u8, start: u64) -> DecryptionAuthorization {
        DecryptionAuthorization {
            keypair: EphemeralKeypair {
                public_key: format!("pk-{}", start),
                private_key: format!("sk-{}", start),
            },
            signature: vec![user; 32],
            contract_addresses: vec![Address::new([0xC0; 20])],
            user_address: Address::new([user; 20]),
            start_timestamp: start,
            duration_days: 365,
        }
    }

    fn fingerprint(record: &DecryptionAuthorization) -> Fingerprint {
        Fingerprint::compute(&record.contract_addresses, &record.user_address)
    }

    fn store() -> (tempfile::TempDir, AuthorizationStore) {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path().join("auth.db")).unwrap();
        let store = AuthorizationStore::new(Arc::new(db)).unwrap();
        (dir, store)
    }

    #[test]
    fn test_save_and_load() {
        let (_dir, store) = store();
        let auth = record(1, 100);
        let fp = fingerprint(&auth);

        assert!(store.load(&fp).unwrap().is_none());
        store.save(&fp, &auth).unwrap();

        assert_eq!(store.load(&fp).unwrap(), Some(auth));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_save_replaces_record() {
        let (_dir, store) = store();
        let fp = fingerprint(&record(1, 100));

        store.save(&fp, &record(1, 100)).unwrap();
        store.save(&fp, &record(1, 200)).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.load(&fp).unwrap().unwrap().start_timestamp, 200);
    }

    #[test]
    fn test_list_remove_clear() {
        let (_dir, store) = store();
        for user in 1..=3 {
            let auth = record(user, 100);
            store.save(&fingerprint(&auth), &auth).unwrap();
        }
        assert_eq!(store.list().unwrap().len(), 3);
        store.verify().unwrap();

        let fp = fingerprint(&record(2, 100));
        assert!(store.remove(&fp).unwrap());
        assert!(!store.remove(&fp).unwrap());
        assert_eq!(store.count().unwrap(), 2);

        assert_eq!(store.clear().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_verify_detects_misplaced_record() {
        let (_dir, store) = store();
        store
            .save(&Fingerprint::from_hex("00"), &record(1, 100))
            .unwrap();

        assert!(matches!(store.verify(), Err(StorageError::Corruption(_))));
    }
}
