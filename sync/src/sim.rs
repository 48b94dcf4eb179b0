//! In-memory simulation of the external collaborators
//!
//! A single-process stand-in for the health analyzer contract, the
//! confidential backend client, the wallet signer and the connection state.
//! Plaintexts live in a shared [`CiphertextStore`] keyed by handle; the ledger
//! computes over them and issues fresh handles the way the real contract
//! would, so the sync core sees only handles.

use crate::authorization::AuthorizationMessage;
use crate::clock::Clock;
use crate::errors::{SyncError, SyncResult};
use crate::events::{address_topic, event_topic, TimeSeriesStatsEvent};
use crate::fhe::{
    DecryptedValues, DecryptionCapability, EncryptedInputs, EphemeralKeypair, UserDecryptRequest,
};
use crate::ledger::{HealthLedger, HealthSubmission, LogEntry, Signer, TransactionReceipt, TxHash};
use crate::session::ConnectionState;
use crate::types::{Address, ClearScalar, EncryptedHandle, TimeSeriesAggregateHandles};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Deterministic signature of `signer` over `message`
pub fn signature_for(signer: &Address, message: &AuthorizationMessage) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"cipherpulse.sim.signature");
    hasher.update(signer.as_bytes());
    hasher.update(&message.digest());
    hasher.finalize().as_bytes().to_vec()
}

/// Proof binding input handles to a contract and user
fn input_proof(contract: &Address, user: &Address, handles: &[EncryptedHandle]) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"cipherpulse.sim.input-proof");
    hasher.update(contract.as_bytes());
    hasher.update(user.as_bytes());
    for handle in handles {
        hasher.update(handle.as_bytes());
    }
    hasher.finalize().as_bytes().to_vec()
}

async fn simulate_latency(latency: &Mutex<Option<Duration>>) {
    let latency = *latency.lock();
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

/// A plaintext behind a handle plus its access list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCiphertext {
    pub contract: Address,
    pub value: ClearScalar,
    pub allowed: Vec<Address>,
}

/// Handle → plaintext table shared by the simulated ledger and backend.
#[derive(Debug, Default)]
pub struct CiphertextStore {
    entries: RwLock<HashMap<EncryptedHandle, StoredCiphertext>>,
    next_id: AtomicU64,
}

impl CiphertextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plaintext under a caller-chosen handle
    pub fn insert(
        &self,
        handle: EncryptedHandle,
        contract: Address,
        value: ClearScalar,
        allowed: &[Address],
    ) {
        self.entries.write().insert(
            handle,
            StoredCiphertext {
                contract,
                value,
                allowed: allowed.to_vec(),
            },
        );
    }

    /// Register a plaintext under a fresh, never-zero handle
    pub fn issue(&self, contract: Address, value: ClearScalar, allowed: &[Address]) -> EncryptedHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"cipherpulse.sim.handle");
        hasher.update(contract.as_bytes());
        hasher.update(&id.to_le_bytes());
        let mut bytes = *hasher.finalize().as_bytes();
        bytes[31] |= 1;

        let handle = EncryptedHandle::new(bytes);
        self.insert(handle, contract, value, allowed);
        handle
    }

    pub fn get(&self, handle: &EncryptedHandle) -> Option<StoredCiphertext> {
        self.entries.read().get(handle).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Wallet account that signs without prompting.
#[derive(Debug)]
pub struct LocalSigner {
    address: Address,
    declining: AtomicBool,
    sign_count: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

impl LocalSigner {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            declining: AtomicBool::new(false),
            sign_count: AtomicUsize::new(0),
            latency: Mutex::new(None),
        }
    }

    /// Signer with a random address
    pub fn random() -> Self {
        let mut bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(Address::new(bytes))
    }

    /// Reject every following signing request, as a user would
    pub fn set_declining(&self, declining: bool) {
        self.declining.store(declining, Ordering::SeqCst);
    }

    /// Time the user takes to answer a prompt
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Signing prompts shown so far, declined ones included
    pub fn sign_count(&self) -> usize {
        self.sign_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_structured(&self, message: &AuthorizationMessage) -> SyncResult<Vec<u8>> {
        self.sign_count.fetch_add(1, Ordering::SeqCst);
        simulate_latency(&self.latency).await;

        if self.declining.load(Ordering::SeqCst) {
            return Err(SyncError::Signing("user rejected the request".into()));
        }
        Ok(signature_for(&self.address, message))
    }
}

/// Mutable wallet connection: the chain and the selected account.
#[derive(Default)]
pub struct LiveConnection {
    chain_id: RwLock<Option<u64>>,
    signer: RwLock<Option<Arc<dyn Signer>>>,
}

impl LiveConnection {
    pub fn new(chain_id: Option<u64>) -> Self {
        Self {
            chain_id: RwLock::new(chain_id),
            signer: RwLock::new(None),
        }
    }

    pub fn set_chain_id(&self, chain_id: Option<u64>) {
        debug!(?chain_id, "wallet chain changed");
        *self.chain_id.write() = chain_id;
    }

    pub fn set_signer(&self, signer: Option<Arc<dyn Signer>>) {
        debug!(signer = ?signer.as_ref().map(|s| s.address()), "wallet account changed");
        *self.signer.write() = signer;
    }
}

impl ConnectionState for LiveConnection {
    fn chain_id(&self) -> Option<u64> {
        *self.chain_id.read()
    }

    fn signer(&self) -> Option<Arc<dyn Signer>> {
        self.signer.read().clone()
    }
}

/// Confidential backend client.
pub struct SimulatedFhe {
    store: Arc<CiphertextStore>,
    clock: Arc<dyn Clock>,
    withheld: RwLock<HashSet<EncryptedHandle>>,
    decrypt_calls: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

impl SimulatedFhe {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_store(Arc::new(CiphertextStore::new()), clock)
    }

    pub fn with_store(store: Arc<CiphertextStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            withheld: RwLock::new(HashSet::new()),
            decrypt_calls: AtomicUsize::new(0),
            latency: Mutex::new(None),
        }
    }

    pub fn store(&self) -> Arc<CiphertextStore> {
        self.store.clone()
    }

    /// Leave `handle` out of every following decrypt response
    pub fn withhold(&self, handle: EncryptedHandle) {
        self.withheld.write().insert(handle);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecryptionCapability for SimulatedFhe {
    fn generate_keypair(&self) -> EphemeralKeypair {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        let public = blake3::hash(&secret);
        EphemeralKeypair {
            public_key: hex::encode(public.as_bytes()),
            private_key: hex::encode(secret),
        }
    }

    async fn encrypt_inputs(
        &self,
        contract: Address,
        user: Address,
        values: &[u32],
    ) -> SyncResult<EncryptedInputs> {
        simulate_latency(&self.latency).await;
        let handles: Vec<EncryptedHandle> = values
            .iter()
            .map(|v| {
                self.store
                    .issue(contract, ClearScalar::Uint(u64::from(*v)), &[user])
            })
            .collect();
        let input_proof = input_proof(&contract, &user, &handles);
        Ok(EncryptedInputs {
            handles,
            input_proof,
        })
    }

    async fn user_decrypt(&self, request: &UserDecryptRequest) -> SyncResult<DecryptedValues> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        simulate_latency(&self.latency).await;

        let auth = &request.authorization;
        if !auth.is_valid_at(self.clock.now_secs()) {
            return Err(SyncError::Decryption("authorization outside its validity window".into()));
        }
        if auth.signature != signature_for(&auth.user_address, &auth.message()) {
            return Err(SyncError::Decryption("invalid authorization signature".into()));
        }

        let withheld = self.withheld.read().clone();
        let mut values = DecryptedValues::new();
        for pair in &request.handles {
            if !auth.covers(&pair.contract_address) {
                return Err(SyncError::Decryption(format!(
                    "contract {} not in authorization scope",
                    pair.contract_address
                )));
            }
            if withheld.contains(&pair.handle) {
                continue;
            }
            let stored = self
                .store
                .get(&pair.handle)
                .ok_or_else(|| SyncError::Decryption(format!("unknown handle {}", pair.handle)))?;
            if stored.contract != pair.contract_address
                || !stored.allowed.contains(&auth.user_address)
            {
                return Err(SyncError::Decryption(format!(
                    "{} is not allowed to decrypt {}",
                    auth.user_address, pair.handle
                )));
            }
            values.insert(pair.handle, stored.value);
        }
        Ok(values)
    }
}

/// Plaintext of one submitted reading, as the contract sees it after
/// resolving the input ciphertexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Record {
    heart_rate: u32,
    steps: u32,
    sleep_tenths: u32,
    timestamp: u64,
}

impl Record {
    fn cardio_score(&self) -> u32 {
        100 - self.heart_rate.abs_diff(65).min(100)
    }

    fn activity_score(&self) -> u32 {
        (self.steps / 100).min(100)
    }

    fn sleep_score(&self) -> u32 {
        100 - self.sleep_tenths.abs_diff(80).saturating_mul(5).min(100)
    }

    fn is_anomalous(&self) -> bool {
        self.heart_rate > 120 || self.heart_rate < 40 || self.sleep_tenths < 40
    }
}

/// Mean, wrapping last-minus-first, and mean absolute deviation
fn series_stats(series: &[u32]) -> (u32, u32, u32) {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return (0, 0, 0);
    };
    let n = series.len() as u64;
    let avg = (series.iter().map(|v| u64::from(*v)).sum::<u64>() / n) as u32;
    let trend = last.wrapping_sub(*first);
    let volatility =
        (series.iter().map(|v| u64::from(v.abs_diff(avg))).sum::<u64>() / n) as u32;
    (avg, trend, volatility)
}

type AccountKey = (Address, Address);
type ReceiptHook = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy)]
struct ScoreSet {
    scores: [EncryptedHandle; 4],
    anomaly_flag: EncryptedHandle,
}

/// The health analyzer contract.
pub struct SimulatedLedger {
    store: Arc<CiphertextStore>,
    records: RwLock<HashMap<AccountKey, Vec<Record>>>,
    scores: RwLock<HashMap<AccountKey, ScoreSet>>,
    receipts: Mutex<HashMap<TxHash, TransactionReceipt>>,
    next_tx: AtomicU64,
    block_number: AtomicU64,
    read_count: AtomicUsize,
    latency: Mutex<Option<Duration>>,
    failing: AtomicBool,
    reverting: AtomicBool,
    emit_events: AtomicBool,
    receipt_hook: Mutex<Option<ReceiptHook>>,
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::with_store(Arc::new(CiphertextStore::new()))
    }

    /// Ledger sharing ciphertexts with a [`SimulatedFhe`]
    pub fn with_store(store: Arc<CiphertextStore>) -> Self {
        Self {
            store,
            records: RwLock::new(HashMap::new()),
            scores: RwLock::new(HashMap::new()),
            receipts: Mutex::new(HashMap::new()),
            next_tx: AtomicU64::new(1),
            block_number: AtomicU64::new(1),
            read_count: AtomicUsize::new(0),
            latency: Mutex::new(None),
            failing: AtomicBool::new(false),
            reverting: AtomicBool::new(false),
            emit_events: AtomicBool::new(true),
            receipt_hook: Mutex::new(None),
        }
    }

    pub fn store(&self) -> Arc<CiphertextStore> {
        self.store.clone()
    }

    /// Delay applied to every call
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Reject every following call as if the node were unreachable
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Include following transactions with a failed status
    pub fn set_reverting(&self, reverting: bool) {
        self.reverting.store(reverting, Ordering::SeqCst);
    }

    /// Whether aggregate queries emit their result event
    pub fn set_emit_events(&self, emit: bool) {
        self.emit_events.store(emit, Ordering::SeqCst);
    }

    /// Run `hook` once, while the next receipt is being awaited
    pub fn on_next_receipt(&self, hook: impl FnOnce() + Send + 'static) {
        *self.receipt_hook.lock() = Some(Box::new(hook));
    }

    /// `getHealthScores` calls served
    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Records stored for `user` on `contract`
    pub fn records_for(&self, contract: Address, user: Address) -> usize {
        self.records
            .read()
            .get(&(contract, user))
            .map_or(0, Vec::len)
    }

    fn check_available(&self, method: &'static str) -> SyncResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::ledger(method, "connection refused"));
        }
        Ok(())
    }

    fn include(&self, success: bool, logs: Vec<LogEntry>) -> TxHash {
        let nonce = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let tx_hash = *blake3::hash(&nonce.to_le_bytes()).as_bytes();
        let receipt = TransactionReceipt {
            tx_hash,
            block_number: self.block_number.fetch_add(1, Ordering::SeqCst),
            success,
            logs: if success { logs } else { Vec::new() },
        };
        self.receipts.lock().insert(tx_hash, receipt);
        tx_hash
    }

    fn resolve_input(
        &self,
        handle: &EncryptedHandle,
        contract: Address,
        from: Address,
    ) -> SyncResult<u32> {
        let stored = self
            .store
            .get(handle)
            .ok_or_else(|| SyncError::ledger("submitHealthData", "unknown input handle"))?;
        if stored.contract != contract || !stored.allowed.contains(&from) {
            return Err(SyncError::ledger("submitHealthData", "input not bound to sender"));
        }
        match stored.value {
            ClearScalar::Uint(v) => u32::try_from(v)
                .map_err(|_| SyncError::ledger("submitHealthData", "input wider than 32 bits")),
            _ => Err(SyncError::ledger("submitHealthData", "input is not a euint32")),
        }
    }

    fn recompute_scores(&self, contract: Address, user: Address, latest: &Record) {
        let cardio = latest.cardio_score();
        let activity = latest.activity_score();
        let sleep = latest.sleep_score();
        let overall = (cardio + activity + sleep) / 3;

        let issue = |value: ClearScalar| self.store.issue(contract, value, &[user]);
        let set = ScoreSet {
            scores: [
                issue(ClearScalar::Uint(u64::from(overall))),
                issue(ClearScalar::Uint(u64::from(cardio))),
                issue(ClearScalar::Uint(u64::from(activity))),
                issue(ClearScalar::Uint(u64::from(sleep))),
            ],
            anomaly_flag: issue(ClearScalar::Bool(latest.is_anomalous())),
        };
        self.scores.write().insert((contract, user), set);
    }
}

#[async_trait]
impl HealthLedger for SimulatedLedger {
    async fn get_health_scores(
        &self,
        contract: Address,
        user: Address,
    ) -> SyncResult<[EncryptedHandle; 4]> {
        simulate_latency(&self.latency).await;
        self.check_available("getHealthScores")?;
        self.read_count.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .scores
            .read()
            .get(&(contract, user))
            .map_or([EncryptedHandle::ZERO; 4], |s| s.scores))
    }

    async fn get_anomaly_flag(
        &self,
        contract: Address,
        user: Address,
    ) -> SyncResult<EncryptedHandle> {
        simulate_latency(&self.latency).await;
        self.check_available("getAnomalyFlag")?;
        Ok(self
            .scores
            .read()
            .get(&(contract, user))
            .map_or(EncryptedHandle::ZERO, |s| s.anomaly_flag))
    }

    async fn get_record_count(&self, contract: Address, user: Address) -> SyncResult<u64> {
        simulate_latency(&self.latency).await;
        self.check_available("getRecordCount")?;
        Ok(self.records_for(contract, user) as u64)
    }

    async fn submit_health_data(
        &self,
        contract: Address,
        from: Address,
        submission: &HealthSubmission,
    ) -> SyncResult<TxHash> {
        simulate_latency(&self.latency).await;
        self.check_available("submitHealthData")?;

        let inputs = [
            submission.enc_heart_rate,
            submission.enc_steps,
            submission.enc_sleep_tenths,
        ];
        if submission.input_proof != input_proof(&contract, &from, &inputs) {
            return Err(SyncError::ledger("submitHealthData", "invalid input proof"));
        }
        if self.reverting.load(Ordering::SeqCst) {
            return Ok(self.include(false, Vec::new()));
        }

        let record = Record {
            heart_rate: self.resolve_input(&inputs[0], contract, from)?,
            steps: self.resolve_input(&inputs[1], contract, from)?,
            sleep_tenths: self.resolve_input(&inputs[2], contract, from)?,
            timestamp: submission.timestamp,
        };
        self.records
            .write()
            .entry((contract, from))
            .or_default()
            .push(record);
        self.recompute_scores(contract, from, &record);

        let mut data = [0u8; 32];
        data[24..].copy_from_slice(&record.timestamp.to_be_bytes());
        let log = LogEntry {
            address: contract,
            topics: vec![
                event_topic("HealthDataSubmitted(address,uint256)"),
                address_topic(&from),
            ],
            data: data.to_vec(),
        };
        Ok(self.include(true, vec![log]))
    }

    async fn query_time_series_stats(
        &self,
        contract: Address,
        _from: Address,
        user: Address,
        start_timestamp: u64,
        end_timestamp: u64,
    ) -> SyncResult<TxHash> {
        simulate_latency(&self.latency).await;
        self.check_available("getTimeSeriesStats")?;
        if self.reverting.load(Ordering::SeqCst) {
            return Ok(self.include(false, Vec::new()));
        }

        let window: Vec<Record> = self
            .records
            .read()
            .get(&(contract, user))
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.timestamp >= start_timestamp && r.timestamp <= end_timestamp)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        let column = |f: fn(&Record) -> u32| window.iter().map(f).collect::<Vec<u32>>();
        let heart = series_stats(&column(|r| r.heart_rate));
        let steps = series_stats(&column(|r| r.steps));
        let sleep = series_stats(&column(|r| r.sleep_tenths));

        let positional = [
            heart.0, steps.0, sleep.0, heart.1, steps.1, sleep.1, heart.2, steps.2, sleep.2,
        ];
        let mut handles = [EncryptedHandle::ZERO; 9];
        for (slot, value) in handles.iter_mut().zip(positional) {
            *slot = self
                .store
                .issue(contract, ClearScalar::Uint(u64::from(value)), &[user]);
        }

        let mut logs = Vec::new();
        if self.emit_events.load(Ordering::SeqCst) {
            let event = TimeSeriesStatsEvent {
                user,
                handles: TimeSeriesAggregateHandles::from_positional(handles),
            };
            logs.push(event.to_log(contract));
        }
        Ok(self.include(true, logs))
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> SyncResult<TransactionReceipt> {
        simulate_latency(&self.latency).await;
        let hook = self.receipt_hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        self.check_available("waitForReceipt")?;

        self.receipts
            .lock()
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| SyncError::ReceiptNotFound(format!("0x{}", hex::encode(tx_hash))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::find_time_series_event;
    use crate::types::TimeSeriesField;

    const CONTRACT: Address = Address::new([0xC0; 20]);
    const USER: Address = Address::new([0x11; 20]);

    async fn submit(
        fhe: &SimulatedFhe,
        ledger: &SimulatedLedger,
        values: [u32; 3],
        timestamp: u64,
    ) -> TransactionReceipt {
        let enc = fhe.encrypt_inputs(CONTRACT, USER, &values).await.unwrap();
        let submission = HealthSubmission {
            enc_heart_rate: enc.handles[0],
            enc_steps: enc.handles[1],
            enc_sleep_tenths: enc.handles[2],
            input_proof: enc.input_proof,
            timestamp,
        };
        let tx = ledger
            .submit_health_data(CONTRACT, USER, &submission)
            .await
            .unwrap();
        ledger.wait_for_receipt(tx).await.unwrap()
    }

    fn pair() -> (SimulatedFhe, SimulatedLedger) {
        let fhe = SimulatedFhe::new(Arc::new(ManualClock::new(1_700_000_000)));
        let ledger = SimulatedLedger::with_store(fhe.store());
        (fhe, ledger)
    }

    #[test]
    fn test_score_formulas() {
        let record = Record {
            heart_rate: 72,
            steps: 8500,
            sleep_tenths: 75,
            timestamp: 0,
        };
        assert_eq!(record.cardio_score(), 93);
        assert_eq!(record.activity_score(), 85);
        assert_eq!(record.sleep_score(), 75);
        assert!(!record.is_anomalous());

        let tachycardic = Record {
            heart_rate: 130,
            ..record
        };
        assert!(tachycardic.is_anomalous());
    }

    #[test]
    fn test_series_stats_wraps_negative_trend() {
        let (avg, trend, volatility) = series_stats(&[80, 79]);
        assert_eq!(avg, 79);
        assert_eq!(trend, u32::MAX);
        assert_eq!(volatility, 0);
        assert_eq!(series_stats(&[]), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_submission_issues_score_handles() {
        let (fhe, ledger) = pair();
        let receipt = submit(&fhe, &ledger, [72, 8500, 75], 10).await;

        assert!(receipt.success);
        assert_eq!(ledger.records_for(CONTRACT, USER), 1);
        let scores = ledger.get_health_scores(CONTRACT, USER).await.unwrap();
        assert!(scores.iter().all(|h| !h.is_zero()));
        assert_eq!(
            fhe.store().get(&scores[1]).unwrap().value,
            ClearScalar::Uint(93)
        );
    }

    #[tokio::test]
    async fn test_aggregate_event_carries_stats() {
        let (fhe, ledger) = pair();
        submit(&fhe, &ledger, [70, 8000, 80], 10).await;
        submit(&fhe, &ledger, [66, 9000, 70], 20).await;

        let tx = ledger
            .query_time_series_stats(CONTRACT, USER, USER, 0, 100)
            .await
            .unwrap();
        let receipt = ledger.wait_for_receipt(tx).await.unwrap();
        let event = find_time_series_event(&receipt, CONTRACT).unwrap();

        let value = |field| fhe.store().get(&event.handles.get(field)).unwrap().value;
        assert_eq!(value(TimeSeriesField::AvgHeartRate), ClearScalar::Uint(68));
        assert_eq!(
            value(TimeSeriesField::TrendHeartRate),
            ClearScalar::Uint(u64::from(u32::MAX - 3))
        );
        assert_eq!(value(TimeSeriesField::TrendSteps), ClearScalar::Uint(1000));
        assert_eq!(value(TimeSeriesField::VolatilitySleep), ClearScalar::Uint(5));
    }

    #[tokio::test]
    async fn test_tampered_proof_is_rejected() {
        let (fhe, ledger) = pair();
        let enc = fhe.encrypt_inputs(CONTRACT, USER, &[1, 2, 3]).await.unwrap();
        let submission = HealthSubmission {
            enc_heart_rate: enc.handles[0],
            enc_steps: enc.handles[1],
            enc_sleep_tenths: enc.handles[2],
            input_proof: vec![0u8; 32],
            timestamp: 0,
        };

        assert!(ledger
            .submit_health_data(CONTRACT, USER, &submission)
            .await
            .is_err());
        assert_eq!(ledger.records_for(CONTRACT, USER), 0);
    }
}
