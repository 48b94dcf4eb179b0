//! CipherPulse Sync Core
//!
//! Client-side synchronization of encrypted health state: opaque ciphertext
//! handles read from the ledger, cached decryption authorizations, and clear
//! values that are only ever applied under the session context they were
//! requested in.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     HealthSession                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐         │
//! │  │ Submission  │  │   Handle    │  │  Aggregate  │         │
//! │  │  Pipeline   │─▶│ Synchronizer│  │    Query    │         │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘         │
//! │         │                │                │                 │
//! │         │                ▼                ▼                 │
//! │         │        ┌─────────────────────────────────────┐   │
//! │         │        │     Batch Decryption Orchestrator    │   │
//! │         │        │  - authorization cache               │   │
//! │         │        │  - two's-complement normalization    │   │
//! │         │        └─────────────────────────────────────┘   │
//! │         ▼                                                   │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │        Session Context Tracker (staleness)           │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Features
//!
//! - **Staleness checks**: results that arrive after an account, chain or
//!   contract switch are discarded
//! - **Authorization reuse**: one signing prompt per contract set and user
//!   for the whole validity window
//! - **Per-category guards**: overlapping calls of one operation are dropped
//! - **Simulation**: in-memory ledger, backend and signer for tests and demos

pub mod aggregate;
pub mod authorization;
pub mod client;
pub mod clock;
pub mod decrypt;
pub mod deployment;
pub mod errors;
pub mod events;
pub mod fhe;
pub mod guard;
pub mod handles;
pub mod ledger;
pub mod normalize;
pub mod outcome;
pub mod session;
pub mod sim;
pub mod state;
pub mod submit;
pub mod types;

// Re-export main types
pub use aggregate::{AggregateQuery, AggregateWindow};
pub use authorization::{
    AuthorizationCache, AuthorizationConfig, AuthorizationMessage, AuthorizationStorage,
    DecryptionAuthorization, Fingerprint, InMemoryAuthorizationStorage,
};
pub use client::{HealthSession, HealthSessionBuilder, ReadinessFlags, SessionConfig, SessionView};
pub use clock::{Clock, ManualClock, SystemClock};
pub use decrypt::BatchDecryptor;
pub use deployment::{Deployment, DeploymentRegistry, LOCAL_CHAIN_ID, SEPOLIA_CHAIN_ID};
pub use errors::{SyncError, SyncResult};
pub use events::{find_time_series_event, TimeSeriesStatsEvent};
pub use fhe::{DecryptionCapability, EncryptedInputs, EphemeralKeypair, UserDecryptRequest};
pub use guard::{Operation, OperationGuards};
pub use handles::HandleSynchronizer;
pub use ledger::{HealthLedger, HealthSubmission, LogEntry, Signer, TransactionReceipt, TxHash};
pub use normalize::{normalize_signed32, normalize_wire};
pub use outcome::OperationOutcome;
pub use session::{ConnectionState, Freshness, SessionContext, SessionSnapshot, SessionTracker};
pub use state::{ClearValues, SharedState, SyncState};
pub use submit::{HealthReading, SubmissionPipeline};
pub use types::{
    Address, ClearScalar, ClearValue, EncryptedHandle, MetricField, ScoreField, ScoreHandles,
    TimeSeriesAggregateHandles, TimeSeriesField,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::aggregate::AggregateWindow;
    pub use crate::client::{HealthSession, HealthSessionBuilder, SessionConfig, SessionView};
    pub use crate::errors::{SyncError, SyncResult};
    pub use crate::outcome::OperationOutcome;
    pub use crate::submit::HealthReading;
    pub use crate::types::{Address, ClearScalar, EncryptedHandle, ScoreField, TimeSeriesField};
}
