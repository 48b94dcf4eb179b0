//! Session context tracking
//!
//! Every asynchronous operation captures a [`SessionSnapshot`] before its
//! first suspension point and re-checks it before writing shared state. A
//! snapshot is stale once the live chain, signer or resolved contract differs
//! from what was captured; stale results are dropped, not reported as errors.

use crate::deployment::{Deployment, DeploymentRegistry};
use crate::ledger::Signer;
use crate::types::Address;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Live wallet connection state, owned by the wallet integration.
pub trait ConnectionState: Send + Sync {
    /// Chain the wallet is currently connected to
    fn chain_id(&self) -> Option<u64>;

    /// Currently selected signer
    fn signer(&self) -> Option<Arc<dyn Signer>>;
}

/// Pass-through queries over the live connection.
#[derive(Clone)]
pub struct SessionTracker {
    connection: Arc<dyn ConnectionState>,
    registry: Arc<DeploymentRegistry>,
}

impl SessionTracker {
    pub fn new(connection: Arc<dyn ConnectionState>, registry: Arc<DeploymentRegistry>) -> Self {
        Self {
            connection,
            registry,
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.connection.chain_id()
    }

    pub fn signer(&self) -> Option<Arc<dyn Signer>> {
        self.connection.signer()
    }

    pub fn signer_address(&self) -> Option<Address> {
        self.connection.signer().map(|s| s.address())
    }

    pub fn registry(&self) -> &DeploymentRegistry {
        &self.registry
    }

    /// Deployment for the current chain, if any
    pub fn deployment(&self) -> Option<Deployment> {
        self.registry.resolve(self.chain_id()).cloned()
    }

    pub fn contract_address(&self) -> Option<Address> {
        self.registry.resolve(self.chain_id()).map(|d| d.address)
    }

    pub fn chain_still_current(&self, chain_id: Option<u64>) -> bool {
        self.connection.chain_id() == chain_id
    }

    pub fn signer_still_current(&self, identity: Option<Address>) -> bool {
        self.signer_address() == identity
    }

    /// Capture the context an operation starts under
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            context: SessionContext {
                chain_id: self.chain_id(),
                signer: self.signer_address(),
                contract: self.contract_address(),
            },
            tracker: self.clone(),
        }
    }
}

/// The `(chain, signer, contract)` tuple active when an operation began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionContext {
    pub chain_id: Option<u64>,
    pub signer: Option<Address>,
    pub contract: Option<Address>,
}

/// A captured context plus the means to re-validate it.
#[derive(Clone)]
pub struct SessionSnapshot {
    context: SessionContext,
    tracker: SessionTracker,
}

impl SessionSnapshot {
    pub fn context(&self) -> SessionContext {
        self.context
    }

    /// True once the live environment no longer matches the capture
    pub fn is_stale(&self) -> bool {
        let chain_changed = !self.tracker.chain_still_current(self.context.chain_id);
        let signer_changed = !self.tracker.signer_still_current(self.context.signer);
        let contract_changed = self.tracker.contract_address() != self.context.contract;

        let stale = chain_changed || signer_changed || contract_changed;
        if stale {
            debug!(
                chain_changed,
                signer_changed, contract_changed, "session context went stale"
            );
        }
        stale
    }

    /// Wrap `value` as current, or drop it if the context went stale
    pub fn check<T>(&self, value: T) -> Freshness<T> {
        if self.is_stale() {
            Freshness::Stale
        } else {
            Freshness::Current(value)
        }
    }
}

impl fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("context", &self.context)
            .finish()
    }
}

/// Outcome of an internal step that may have been overtaken by a context
/// change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness<T> {
    Current(T),
    Stale,
}

impl<T> Freshness<T> {
    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{Deployment, LOCAL_CHAIN_ID, SEPOLIA_CHAIN_ID};
    use crate::sim::{LiveConnection, LocalSigner};

    fn tracker() -> (Arc<LiveConnection>, SessionTracker) {
        let registry = DeploymentRegistry::from_deployments([
            Deployment::new(LOCAL_CHAIN_ID, "hardhat", Address::new([1u8; 20])),
            Deployment::new(SEPOLIA_CHAIN_ID, "sepolia", Address::new([2u8; 20])),
        ]);
        let connection = Arc::new(LiveConnection::new(Some(LOCAL_CHAIN_ID)));
        connection.set_signer(Some(Arc::new(LocalSigner::new(Address::new([9u8; 20])))));

        let tracker = SessionTracker::new(connection.clone(), Arc::new(registry));
        (connection, tracker)
    }

    #[test]
    fn test_fresh_snapshot_is_current() {
        let (_connection, tracker) = tracker();
        let snapshot = tracker.snapshot();

        assert!(!snapshot.is_stale());
        assert_eq!(snapshot.context().contract, Some(Address::new([1u8; 20])));
        assert_eq!(snapshot.check(5), Freshness::Current(5));
    }

    #[test]
    fn test_chain_switch_is_stale() {
        let (connection, tracker) = tracker();
        let snapshot = tracker.snapshot();

        connection.set_chain_id(Some(SEPOLIA_CHAIN_ID));
        assert!(snapshot.is_stale());
        assert!(snapshot.check(()).is_stale());
    }

    #[test]
    fn test_signer_switch_is_stale() {
        let (connection, tracker) = tracker();
        let snapshot = tracker.snapshot();

        connection.set_signer(Some(Arc::new(LocalSigner::new(Address::new([8u8; 20])))));
        assert!(snapshot.is_stale());
        assert!(!tracker.signer_still_current(snapshot.context().signer));
    }

    #[test]
    fn test_same_signer_reconnect_is_not_stale() {
        let (connection, tracker) = tracker();
        let snapshot = tracker.snapshot();

        connection.set_signer(Some(Arc::new(LocalSigner::new(Address::new([9u8; 20])))));
        assert!(!snapshot.is_stale());
    }
}
