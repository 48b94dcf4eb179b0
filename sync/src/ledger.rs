//! Ledger and signer interfaces
//!
//! The health analyzer contract performs the confidential aggregation; the
//! sync core only reads handles from it and submits transactions to it.

use crate::authorization::AuthorizationMessage;
use crate::errors::SyncResult;
use crate::types::{Address, EncryptedHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Transaction hash
pub type TxHash = [u8; 32];

/// Encrypted payload of one `submitHealthData` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSubmission {
    pub enc_heart_rate: EncryptedHandle,
    pub enc_steps: EncryptedHandle,
    pub enc_sleep_tenths: EncryptedHandle,
    pub input_proof: Vec<u8>,
    pub timestamp: u64,
}

/// One event log entry of a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract
    pub address: Address,
    /// `topics[0]` identifies the event
    pub topics: Vec<[u8; 32]>,
    /// Non-indexed fields as 32-byte words
    pub data: Vec<u8>,
}

/// Receipt of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// False if the transaction reverted
    pub success: bool,
    pub logs: Vec<LogEntry>,
}

impl TransactionReceipt {
    pub fn status_code(&self) -> u8 {
        u8::from(self.success)
    }
}

/// The health analyzer contract as seen from the client.
#[async_trait]
pub trait HealthLedger: Send + Sync {
    /// `getHealthScores(user)`: overall, cardio, activity, sleep
    async fn get_health_scores(
        &self,
        contract: Address,
        user: Address,
    ) -> SyncResult<[EncryptedHandle; 4]>;

    /// `getAnomalyFlag(user)`
    async fn get_anomaly_flag(&self, contract: Address, user: Address)
        -> SyncResult<EncryptedHandle>;

    /// `getRecordCount(user)`
    async fn get_record_count(&self, contract: Address, user: Address) -> SyncResult<u64>;

    /// Send `submitHealthData(...)` from `from`
    async fn submit_health_data(
        &self,
        contract: Address,
        from: Address,
        submission: &HealthSubmission,
    ) -> SyncResult<TxHash>;

    /// Send `getTimeSeriesStats(user, start, end)` from `from`.
    ///
    /// This is a transaction: the aggregate runs as confidential computation
    /// and its handles are emitted in a `TimeSeriesStatsResult` event.
    async fn query_time_series_stats(
        &self,
        contract: Address,
        from: Address,
        user: Address,
        start_timestamp: u64,
        end_timestamp: u64,
    ) -> SyncResult<TxHash>;

    /// Wait until the transaction is included
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> SyncResult<TransactionReceipt>;
}

/// The user's account.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Stable account address
    fn address(&self) -> Address;

    /// Interactive signing of a structured message; the user may decline
    async fn sign_structured(&self, message: &AuthorizationMessage) -> SyncResult<Vec<u8>>;
}
