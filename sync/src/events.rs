//! Event log decoding
//!
//! Event identifiers are the blake3 hash of the canonical event signature.
//! Indexed parameters occupy `topics[1..]`, the rest are packed into `data`
//! as 32-byte words.

use crate::errors::{SyncError, SyncResult};
use crate::ledger::{LogEntry, TransactionReceipt};
use crate::types::{Address, EncryptedHandle, TimeSeriesAggregateHandles, ADDRESS_SIZE};

/// Size of one ABI word
pub const WORD_SIZE: usize = 32;

/// Name of the aggregate result event
pub const TIME_SERIES_EVENT: &str = "TimeSeriesStatsResult";

const TIME_SERIES_SIGNATURE: &str = "TimeSeriesStatsResult(address,bytes32,bytes32,bytes32,bytes32,bytes32,bytes32,bytes32,bytes32,bytes32)";

/// Compute an event topic from its canonical signature
pub fn event_topic(signature: &str) -> [u8; 32] {
    *blake3::hash(signature.as_bytes()).as_bytes()
}

/// `topics[0]` of `TimeSeriesStatsResult`
pub fn time_series_topic() -> [u8; 32] {
    event_topic(TIME_SERIES_SIGNATURE)
}

/// Left-pad an address into an indexed topic word
pub fn address_topic(address: &Address) -> [u8; 32] {
    let mut word = [0u8; WORD_SIZE];
    word[WORD_SIZE - ADDRESS_SIZE..].copy_from_slice(address.as_bytes());
    word
}

/// A decoded `TimeSeriesStatsResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesStatsEvent {
    pub user: Address,
    pub handles: TimeSeriesAggregateHandles,
}

impl TimeSeriesStatsEvent {
    /// Encode as a log entry emitted by `contract`
    pub fn to_log(&self, contract: Address) -> LogEntry {
        let mut data = Vec::with_capacity(9 * WORD_SIZE);
        for handle in self.handles.as_positional() {
            data.extend_from_slice(handle.as_bytes());
        }
        LogEntry {
            address: contract,
            topics: vec![time_series_topic(), address_topic(&self.user)],
            data,
        }
    }

    /// Decode a log already known to carry this event
    pub fn from_log(log: &LogEntry) -> SyncResult<Self> {
        let decode_err = |reason: String| SyncError::EventDecode {
            event: TIME_SERIES_EVENT,
            reason,
        };

        let user_word = log
            .topics
            .get(1)
            .ok_or_else(|| decode_err("missing indexed user topic".into()))?;
        if user_word[..WORD_SIZE - ADDRESS_SIZE].iter().any(|b| *b != 0) {
            return Err(decode_err("user topic is not a padded address".into()));
        }
        let mut user = [0u8; ADDRESS_SIZE];
        user.copy_from_slice(&user_word[WORD_SIZE - ADDRESS_SIZE..]);

        if log.data.len() != 9 * WORD_SIZE {
            return Err(decode_err(format!(
                "expected {} data bytes, got {}",
                9 * WORD_SIZE,
                log.data.len()
            )));
        }

        let mut handles = [EncryptedHandle::ZERO; 9];
        for (slot, word) in handles.iter_mut().zip(log.data.chunks_exact(WORD_SIZE)) {
            let mut bytes = [0u8; WORD_SIZE];
            bytes.copy_from_slice(word);
            *slot = EncryptedHandle::new(bytes);
        }

        Ok(Self {
            user: Address::new(user),
            handles: TimeSeriesAggregateHandles::from_positional(handles),
        })
    }
}

/// Find and decode the first `TimeSeriesStatsResult` emitted by `contract`.
///
/// Logs from other contracts, or with other topics, are skipped.
pub fn find_time_series_event(
    receipt: &TransactionReceipt,
    contract: Address,
) -> SyncResult<TimeSeriesStatsEvent> {
    let topic = time_series_topic();
    receipt
        .logs
        .iter()
        .find(|log| log.address == contract && log.topics.first() == Some(&topic))
        .ok_or(SyncError::EventNotFound(TIME_SERIES_EVENT))
        .and_then(TimeSeriesStatsEvent::from_log)
}
