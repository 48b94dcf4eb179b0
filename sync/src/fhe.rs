//! Confidential backend client interface
//!
//! Input encryption, ephemeral key generation and user decryption are
//! provided by the backend's client library; the sync core only orchestrates
//! them.

use crate::authorization::DecryptionAuthorization;
use crate::errors::SyncResult;
use crate::types::{Address, ClearScalar, EncryptedHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Ephemeral key pair that re-encrypts decrypted values for the user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct EphemeralKeypair {
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeypair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Ciphertexts for a batch of plaintext inputs plus their validity proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInputs {
    pub handles: Vec<EncryptedHandle>,
    pub input_proof: Vec<u8>,
}

/// A handle together with the contract that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleContractPair {
    pub handle: EncryptedHandle,
    pub contract_address: Address,
}

/// One batched user-decryption request.
#[derive(Debug, Clone)]
pub struct UserDecryptRequest {
    pub handles: Vec<HandleContractPair>,
    pub authorization: DecryptionAuthorization,
}

/// Clear values keyed by the handle they were decrypted from.
pub type DecryptedValues = HashMap<EncryptedHandle, ClearScalar>;

/// Client side of the confidential backend.
#[async_trait]
pub trait DecryptionCapability: Send + Sync {
    /// Fresh ephemeral key pair for a new authorization
    fn generate_keypair(&self) -> EphemeralKeypair;

    /// Encrypt 32-bit plaintexts for `contract`, bound to `user`
    async fn encrypt_inputs(
        &self,
        contract: Address,
        user: Address,
        values: &[u32],
    ) -> SyncResult<EncryptedInputs>;

    /// Decrypt a batch of handles under an authorization.
    ///
    /// The response may omit handles; missing entries are not an error.
    async fn user_decrypt(&self, request: &UserDecryptRequest) -> SyncResult<DecryptedValues>;
}
