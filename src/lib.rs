//! CipherPulse: client-side encrypted health state synchronization
//!
//! This is the root crate that re-exports the CipherPulse components for
//! integration testing and provides unified access to the session API.
//!
//! ## Architecture Overview
//!
//! Health readings are encrypted on the client and submitted to an analyzer
//! contract that computes scores and time-series aggregates homomorphically.
//! The client only ever holds opaque handles; clear values come from a
//! decryption service under a signed, time-bounded authorization.
//!
//! - **Staleness checks**: results that arrive after an account, chain or
//!   contract switch are discarded
//! - **Authorization reuse**: one signing prompt per contract set and user
//! - **Persistence**: authorizations survive restarts in an embedded database
//!
//! ## Crate Organization
//!
//! - `cipherpulse-sync`: session tracking, handle sync, decryption, submission
//! - `cipherpulse-storage`: redb-backed authorization store
//! - `cipherpulse-cli`: the `cipherpulse` command-line tool

// Re-export all crates for integration testing
pub use cipherpulse_storage as storage;
pub use cipherpulse_sync as sync;

/// CipherPulse version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol defaults
pub mod config {
    use cipherpulse_sync::authorization::{DEFAULT_DURATION_DAYS, SECONDS_PER_DAY};

    /// Default validity of a decryption authorization in seconds
    pub const DEFAULT_AUTHORIZATION_SECS: u64 = DEFAULT_DURATION_DAYS as u64 * SECONDS_PER_DAY;

    /// Upper bound added to "now" when querying all records
    pub use cipherpulse_sync::aggregate::ALL_RECORDS_HORIZON;
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use cipherpulse_storage::{Storage, StorageConfig};
    pub use cipherpulse_sync::prelude::*;
    pub use cipherpulse_sync::{Deployment, DeploymentRegistry, ReadinessFlags};
}
