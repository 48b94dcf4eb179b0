//! Sync Core Error Types

use thiserror::Error;

/// Errors that can occur inside encrypted state synchronization.
///
/// None of these cross the session boundary: every top-level operation
/// converts them into an [`OperationOutcome::Failed`](crate::OperationOutcome)
/// and a status message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    // Authorization errors
    #[error("Unable to build decryption authorization")]
    AuthorizationUnavailable,

    #[error("Signing request failed: {0}")]
    Signing(String),

    // Ledger errors
    #[error("Ledger call {method} failed: {reason}")]
    Ledger { method: &'static str, reason: String },

    #[error("Transaction {0} reverted")]
    Reverted(String),

    #[error("Receipt not found for transaction {0}")]
    ReceiptNotFound(String),

    // Confidential backend errors
    #[error("Input encryption failed: {0}")]
    Encryption(String),

    #[error("User decryption failed: {0}")]
    Decryption(String),

    // Event decoding errors
    #[error("{0} event not found in transaction receipt")]
    EventNotFound(&'static str),

    #[error("Failed to parse {event} event: {reason}")]
    EventDecode { event: &'static str, reason: String },

    // Value errors
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // Environment errors
    #[error("Contract deployment not found for chainId={0}")]
    NotDeployed(u64),

    #[error("No signer connected")]
    NoSigner,

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Shorthand for a failed ledger call.
    pub fn ledger(method: &'static str, reason: impl ToString) -> Self {
        SyncError::Ledger {
            method,
            reason: reason.to_string(),
        }
    }
}

/// Result type for sync core operations
pub type SyncResult<T> = Result<T, SyncError>;
