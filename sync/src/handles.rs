//! Handle Synchronizer
//!
//! Pulls the user's current score handles from the ledger. Handles change
//! whenever a new record is aggregated, which invalidates any clear value
//! decrypted from the previous handle.

use crate::guard::Operation;
use crate::ledger::HealthLedger;
use crate::outcome::OperationOutcome;
use crate::session::SessionTracker;
use crate::state::SharedState;
use crate::types::{Address, ScoreHandles};
use std::sync::Arc;
use tracing::{debug, info};

pub struct HandleSynchronizer {
    ledger: Arc<dyn HealthLedger>,
    tracker: SessionTracker,
    state: Arc<SharedState>,
}

impl HandleSynchronizer {
    pub fn new(
        ledger: Arc<dyn HealthLedger>,
        tracker: SessionTracker,
        state: Arc<SharedState>,
    ) -> Self {
        Self {
            ledger,
            tracker,
            state,
        }
    }

    /// Re-read score and anomaly-flag handles for `user` from `contract`.
    ///
    /// Without a contract or user the known handles are cleared. A result
    /// that arrives after the session context changed is dropped.
    pub async fn refresh(
        &self,
        contract: Option<Address>,
        user: Option<Address>,
    ) -> OperationOutcome {
        let Some(_in_flight) = self.state.guards().try_acquire(Operation::Refresh) else {
            debug!("refresh already in flight");
            return OperationOutcome::Busy;
        };

        let (Some(contract), Some(user)) = (contract, user) else {
            self.state.update(|s| s.score_handles = None);
            return OperationOutcome::NotReady;
        };

        let snapshot = self.tracker.snapshot();
        debug!(contract = %contract, user = %user, "refreshing score handles");

        let read = async {
            tokio::try_join!(
                self.ledger.get_health_scores(contract, user),
                self.ledger.get_anomaly_flag(contract, user),
            )
        };

        match read.await {
            Ok((scores, anomaly_flag)) => {
                if snapshot.is_stale() || self.tracker.contract_address() != Some(contract) {
                    debug!("discarding score handles read under a previous context");
                    return OperationOutcome::Stale;
                }

                let handles = ScoreHandles::from_ledger(scores, anomaly_flag);
                info!(
                    overall = %handles.overall.short(),
                    anomaly = %handles.anomaly_flag.short(),
                    "score handles refreshed"
                );
                self.state.update(|s| s.score_handles = Some(handles));
                OperationOutcome::Completed
            }
            Err(e) => {
                self.state.set_status(format!(
                    "HealthAnalyzer.getHealthScores() call failed! error={}",
                    e
                ));
                OperationOutcome::from(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{Deployment, DeploymentRegistry, LOCAL_CHAIN_ID, SEPOLIA_CHAIN_ID};
    use crate::sim::{LiveConnection, LocalSigner, SimulatedLedger};
    use crate::types::EncryptedHandle;
    use std::time::Duration;

    const CONTRACT: Address = Address::new([0xC0; 20]);
    const USER: Address = Address::new([0x11; 20]);

    struct Fixture {
        sync: Arc<HandleSynchronizer>,
        ledger: Arc<SimulatedLedger>,
        connection: Arc<LiveConnection>,
        state: Arc<SharedState>,
    }

    fn fixture() -> Fixture {
        let registry = DeploymentRegistry::from_deployments([
            Deployment::new(LOCAL_CHAIN_ID, "hardhat", CONTRACT),
            Deployment::new(SEPOLIA_CHAIN_ID, "sepolia", Address::new([0xC1; 20])),
        ]);
        let connection = Arc::new(LiveConnection::new(Some(LOCAL_CHAIN_ID)));
        connection.set_signer(Some(Arc::new(LocalSigner::new(USER))));
        let tracker = SessionTracker::new(connection.clone(), Arc::new(registry));

        let ledger = Arc::new(SimulatedLedger::new());
        let state = Arc::new(SharedState::new());
        let sync = Arc::new(HandleSynchronizer::new(
            ledger.clone(),
            tracker,
            state.clone(),
        ));
        Fixture {
            sync,
            ledger,
            connection,
            state,
        }
    }

    #[tokio::test]
    async fn test_refresh_stores_handles() {
        let f = fixture();
        let outcome = f.sync.refresh(Some(CONTRACT), Some(USER)).await;

        assert_eq!(outcome, OperationOutcome::Completed);
        let handles = f.state.read().score_handles.unwrap();
        // No records yet: every handle is the zero sentinel
        assert_eq!(handles.overall, EncryptedHandle::ZERO);
        assert_eq!(f.ledger.read_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_user_clears_handles() {
        let f = fixture();
        f.sync.refresh(Some(CONTRACT), Some(USER)).await;
        assert!(f.state.read().score_handles.is_some());

        let outcome = f.sync.refresh(Some(CONTRACT), None).await;
        assert_eq!(outcome, OperationOutcome::NotReady);
        assert!(f.state.read().score_handles.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_reads_once() {
        let f = fixture();
        f.ledger.set_latency(Duration::from_millis(20));

        let (a, b) = tokio::join!(
            f.sync.refresh(Some(CONTRACT), Some(USER)),
            f.sync.refresh(Some(CONTRACT), Some(USER)),
        );

        assert_eq!(f.ledger.read_count(), 1);
        assert!(matches!(
            (a, b),
            (OperationOutcome::Completed, OperationOutcome::Busy)
                | (OperationOutcome::Busy, OperationOutcome::Completed)
        ));
    }

    #[tokio::test]
    async fn test_chain_switch_discards_result() {
        let f = fixture();
        f.ledger.set_latency(Duration::from_millis(20));

        let switch = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            f.connection.set_chain_id(Some(SEPOLIA_CHAIN_ID));
        };
        let (outcome, _) = tokio::join!(f.sync.refresh(Some(CONTRACT), Some(USER)), switch);

        assert_eq!(outcome, OperationOutcome::Stale);
        assert!(f.state.read().score_handles.is_none());
    }

    #[tokio::test]
    async fn test_read_failure_keeps_previous_handles() {
        let f = fixture();
        f.sync.refresh(Some(CONTRACT), Some(USER)).await;
        let before = f.state.read().score_handles;

        f.ledger.set_failing(true);
        let outcome = f.sync.refresh(Some(CONTRACT), Some(USER)).await;

        assert!(outcome.is_failed());
        assert_eq!(f.state.read().score_handles, before);
        assert!(f
            .state
            .status()
            .starts_with("HealthAnalyzer.getHealthScores() call failed! error="));
        assert!(!f.state.guards().is_busy(Operation::Refresh));
    }
}
