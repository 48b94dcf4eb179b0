//! Decryption Authorization Cache
//!
//! User decryption needs a signed, time-bounded authorization scoped to a set
//! of contracts. Signing is an interactive wallet prompt, so authorizations
//! are persisted by fingerprint and reused until they expire.
//!
//! # Flow
//!
//! ```text
//! load_or_sign(contracts, user)
//!      │
//!      ├── fingerprint = H(sorted contracts, user)
//!      ├── lock fingerprint            (one signing ceremony at a time)
//!      ├── storage.get(fingerprint) ── valid & same scope ──► reuse
//!      │
//!      └── generate keypair ─► sign message ─► storage.put ─► new
//! ```

use crate::clock::Clock;
use crate::errors::{SyncError, SyncResult};
use crate::fhe::{DecryptionCapability, EphemeralKeypair};
use crate::ledger::Signer;
use crate::types::Address;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Seconds per validity day
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Default validity of a new authorization
pub const DEFAULT_DURATION_DAYS: u32 = 365;

const FINGERPRINT_DOMAIN: &[u8] = b"cipherpulse.authorization.v1";

/// Authorization cache configuration
#[derive(Debug, Clone)]
pub struct AuthorizationConfig {
    /// Validity of newly signed authorizations, in days
    pub duration_days: u32,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            duration_days: DEFAULT_DURATION_DAYS,
        }
    }
}

/// Cache key derived from `(sorted contract set, user)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(contracts: &[Address], user: &Address) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(FINGERPRINT_DOMAIN);
        for contract in normalize_scope(contracts) {
            hasher.update(contract.as_bytes());
        }
        hasher.update(user.as_bytes());
        Fingerprint(hex::encode(hasher.finalize().as_bytes()))
    }

    /// Rebuild from a stored key
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Fingerprint(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sorted, de-duplicated contract scope
fn normalize_scope(contracts: &[Address]) -> Vec<Address> {
    let mut scope = contracts.to_vec();
    scope.sort();
    scope.dedup();
    scope
}

/// The structured message the user signs to grant decryption rights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationMessage {
    pub public_key: String,
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    pub start_timestamp: u64,
    pub duration_days: u32,
}

impl AuthorizationMessage {
    /// Digest committed to by the signature
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"UserDecryptRequest");
        hasher.update(self.public_key.as_bytes());
        for contract in &self.contract_addresses {
            hasher.update(contract.as_bytes());
        }
        hasher.update(self.user_address.as_bytes());
        hasher.update(&self.start_timestamp.to_le_bytes());
        hasher.update(&self.duration_days.to_le_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// A signed, time-bounded capability to decrypt handles of a contract set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionAuthorization {
    pub keypair: EphemeralKeypair,
    pub signature: Vec<u8>,
    /// Sorted and de-duplicated
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    pub start_timestamp: u64,
    pub duration_days: u32,
}

impl DecryptionAuthorization {
    /// First second at which the authorization is no longer usable
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(u64::from(self.duration_days) * SECONDS_PER_DAY)
    }

    /// `now ∈ [start, start + duration)`
    pub fn is_valid_at(&self, now: u64) -> bool {
        now >= self.start_timestamp && now < self.expires_at()
    }

    pub fn covers(&self, contract: &Address) -> bool {
        self.contract_addresses.binary_search(contract).is_ok()
    }

    /// Whether the scope is exactly `contracts` (order and duplicates ignored)
    pub fn scope_matches(&self, contracts: &[Address]) -> bool {
        self.contract_addresses == normalize_scope(contracts)
    }

    /// The message this authorization's signature covers
    pub fn message(&self) -> AuthorizationMessage {
        AuthorizationMessage {
            public_key: self.keypair.public_key.clone(),
            contract_addresses: self.contract_addresses.clone(),
            user_address: self.user_address,
            start_timestamp: self.start_timestamp,
            duration_days: self.duration_days,
        }
    }
}

/// Persistent key-value store for authorizations.
pub trait AuthorizationStorage: Send + Sync {
    fn get(&self, fingerprint: &Fingerprint) -> SyncResult<Option<DecryptionAuthorization>>;

    fn put(&self, fingerprint: &Fingerprint, record: &DecryptionAuthorization) -> SyncResult<()>;
}

/// Process-local storage; authorizations are lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryAuthorizationStorage {
    entries: RwLock<HashMap<Fingerprint, DecryptionAuthorization>>,
}

impl InMemoryAuthorizationStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl AuthorizationStorage for InMemoryAuthorizationStorage {
    fn get(&self, fingerprint: &Fingerprint) -> SyncResult<Option<DecryptionAuthorization>> {
        Ok(self.entries.read().get(fingerprint).cloned())
    }

    fn put(&self, fingerprint: &Fingerprint, record: &DecryptionAuthorization) -> SyncResult<()> {
        self.entries
            .write()
            .insert(fingerprint.clone(), record.clone());
        Ok(())
    }
}

/// Loads cached authorizations or runs a signing ceremony for a new one.
pub struct AuthorizationCache {
    config: AuthorizationConfig,
    storage: Arc<dyn AuthorizationStorage>,
    fhe: Arc<dyn DecryptionCapability>,
    clock: Arc<dyn Clock>,
    /// One lock per fingerprint with a ceremony pending or running
    in_flight: LockMap,
    signing_requests: AtomicUsize,
}

impl AuthorizationCache {
    pub fn new(
        config: AuthorizationConfig,
        storage: Arc<dyn AuthorizationStorage>,
        fhe: Arc<dyn DecryptionCapability>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            storage,
            fhe,
            clock,
            in_flight: Mutex::new(HashMap::new()),
            signing_requests: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    /// Signing ceremonies started by this cache
    pub fn signing_requests(&self) -> usize {
        self.signing_requests.load(Ordering::Relaxed)
    }

    /// Return a usable authorization for `contracts`, signing a new one only
    /// when none is cached or the cached one expired.
    ///
    /// `None` means the user declined or signing failed; callers must abort
    /// without touching any clear value.
    pub async fn load_or_sign(
        &self,
        contracts: &[Address],
        user: Address,
        signer: &dyn Signer,
    ) -> Option<DecryptionAuthorization> {
        let fingerprint = Fingerprint::compute(contracts, &user);
        let entry = InFlightEntry::register(&self.in_flight, fingerprint);

        let result = {
            let _ceremony = entry.lock.clone().lock_owned().await;
            self.load_or_sign_locked(&entry.fingerprint, contracts, user, signer)
                .await
        };
        let fingerprint = entry.release();

        match result {
            Ok(authorization) => Some(authorization),
            Err(e) => {
                warn!(%fingerprint, "decryption authorization unavailable: {}", e);
                None
            }
        }
    }

    async fn load_or_sign_locked(
        &self,
        fingerprint: &Fingerprint,
        contracts: &[Address],
        user: Address,
        signer: &dyn Signer,
    ) -> SyncResult<DecryptionAuthorization> {
        let now = self.clock.now_secs();

        match self.storage.get(fingerprint) {
            Ok(Some(cached))
                if cached.is_valid_at(now)
                    && cached.scope_matches(contracts)
                    && cached.user_address == user =>
            {
                debug!(%fingerprint, expires_at = cached.expires_at(), "reusing cached authorization");
                return Ok(cached);
            }
            Ok(Some(cached)) => {
                debug!(%fingerprint, expires_at = cached.expires_at(), now, "cached authorization unusable, re-signing");
            }
            Ok(None) => {}
            Err(e) => warn!(%fingerprint, "authorization lookup failed, re-signing: {}", e),
        }

        if signer.address() != user {
            return Err(SyncError::Signing(format!(
                "signer {} cannot authorize for {}",
                signer.address(),
                user
            )));
        }

        let keypair = self.fhe.generate_keypair();
        let message = AuthorizationMessage {
            public_key: keypair.public_key.clone(),
            contract_addresses: normalize_scope(contracts),
            user_address: user,
            start_timestamp: now,
            duration_days: self.config.duration_days,
        };

        self.signing_requests.fetch_add(1, Ordering::Relaxed);
        info!(%fingerprint, user = %user, "requesting decryption authorization signature");
        let signature = signer.sign_structured(&message).await?;

        let authorization = DecryptionAuthorization {
            keypair,
            signature,
            contract_addresses: message.contract_addresses,
            user_address: user,
            start_timestamp: message.start_timestamp,
            duration_days: message.duration_days,
        };

        if let Err(e) = self.storage.put(fingerprint, &authorization) {
            warn!(%fingerprint, "failed to persist authorization: {}", e);
        }

        Ok(authorization)
    }
}

type LockMap = Mutex<HashMap<Fingerprint, Arc<tokio::sync::Mutex<()>>>>;

/// A caller's claim on a fingerprint lock. The map entry is removed when the
/// last claim goes away, including when the caller's future is dropped.
struct InFlightEntry<'a> {
    map: &'a LockMap,
    fingerprint: Fingerprint,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> InFlightEntry<'a> {
    fn register(map: &'a LockMap, fingerprint: Fingerprint) -> Self {
        let lock = map.lock().entry(fingerprint.clone()).or_default().clone();
        Self {
            map,
            fingerprint,
            lock,
        }
    }

    fn release(self) -> Fingerprint {
        self.fingerprint.clone()
    }
}

impl Drop for InFlightEntry<'_> {
    fn drop(&mut self) {
        let mut map = self.map.lock();
        let ours = map
            .get(&self.fingerprint)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock));
        // the map and this claim are the only holders left
        if ours && Arc::strong_count(&self.lock) <= 2 {
            map.remove(&self.fingerprint);
        }
    }
}
