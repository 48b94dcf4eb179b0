//! Mutation Submission Pipeline
//!
//! Encrypts one health reading, sends it to the ledger and refreshes the
//! score handles once the transaction is included. A transaction that was
//! sent stays on the ledger even if the session context changes afterwards;
//! only the follow-up refresh is skipped.

use crate::clock::Clock;
use crate::errors::SyncError;
use crate::fhe::DecryptionCapability;
use crate::guard::Operation;
use crate::handles::HandleSynchronizer;
use crate::ledger::{HealthLedger, HealthSubmission, Signer};
use crate::outcome::OperationOutcome;
use crate::session::SessionTracker;
use crate::state::SharedState;
use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const IGNORE_STATUS: &str = "Ignore submission";

/// One day of health metrics in plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReading {
    /// Beats per minute
    pub heart_rate: u32,
    pub steps: u32,
    /// Sleep duration in tenths of an hour
    pub sleep_tenths: u32,
}

impl HealthReading {
    pub fn new(heart_rate: u32, steps: u32, sleep_tenths: u32) -> Self {
        Self {
            heart_rate,
            steps,
            sleep_tenths,
        }
    }

    /// Build from fractional sleep hours, truncated to tenths
    pub fn from_hours(heart_rate: u32, steps: u32, sleep_hours: f64) -> Self {
        let sleep_tenths = (sleep_hours.max(0.0) * 10.0).floor() as u32;
        Self::new(heart_rate, steps, sleep_tenths)
    }

    /// Plaintexts in the order the contract expects them
    pub fn as_inputs(&self) -> [u32; 3] {
        [self.heart_rate, self.steps, self.sleep_tenths]
    }
}

pub struct SubmissionPipeline {
    ledger: Arc<dyn HealthLedger>,
    fhe: Arc<dyn DecryptionCapability>,
    handles: Arc<HandleSynchronizer>,
    tracker: SessionTracker,
    state: Arc<SharedState>,
    clock: Arc<dyn Clock>,
    refresh_after_submit: bool,
}

impl SubmissionPipeline {
    pub fn new(
        ledger: Arc<dyn HealthLedger>,
        fhe: Arc<dyn DecryptionCapability>,
        handles: Arc<HandleSynchronizer>,
        tracker: SessionTracker,
        state: Arc<SharedState>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            fhe,
            handles,
            tracker,
            state,
            clock,
            refresh_after_submit: true,
        }
    }

    /// Whether a successful submission refreshes the score handles
    pub fn with_refresh_after_submit(mut self, enabled: bool) -> Self {
        self.refresh_after_submit = enabled;
        self
    }

    /// Encrypt and submit `reading` to `contract` from the signer's account.
    pub async fn submit(
        &self,
        reading: HealthReading,
        contract: Address,
        signer: Arc<dyn Signer>,
    ) -> OperationOutcome {
        let Some(_in_flight) = self.state.guards().try_acquire(Operation::Submit) else {
            debug!("submission already in flight");
            return OperationOutcome::Busy;
        };

        let snapshot = self.tracker.snapshot();
        let user = signer.address();
        self.state.set_status("Starting encryption...");

        let encrypted = match self
            .fhe
            .encrypt_inputs(contract, user, &reading.as_inputs())
            .await
        {
            Ok(encrypted) => encrypted,
            Err(e) => return self.fail(e),
        };
        let [enc_heart_rate, enc_steps, enc_sleep_tenths] = match encrypted.handles[..] {
            [a, b, c] => [a, b, c],
            _ => {
                return self.fail(SyncError::Encryption(format!(
                    "expected 3 ciphertexts, got {}",
                    encrypted.handles.len()
                )))
            }
        };

        if snapshot.is_stale() {
            self.state.set_status(IGNORE_STATUS);
            return OperationOutcome::Stale;
        }

        self.state.set_status("Submitting health data...");
        let submission = HealthSubmission {
            enc_heart_rate,
            enc_steps,
            enc_sleep_tenths,
            input_proof: encrypted.input_proof,
            timestamp: self.clock.now_secs(),
        };

        let tx_hash = match self
            .ledger
            .submit_health_data(contract, user, &submission)
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(e) => return self.fail(e),
        };
        let tx_hex = format!("0x{}", hex::encode(tx_hash));
        self.state.set_status(format!("Wait for tx:{}...", tx_hex));

        let receipt = match self.ledger.wait_for_receipt(tx_hash).await {
            Ok(receipt) => receipt,
            Err(e) => return self.fail(e),
        };
        self.state.set_status(format!(
            "Submission completed status={}",
            receipt.status_code()
        ));
        if !receipt.success {
            return self.fail(SyncError::Reverted(tx_hex));
        }
        info!(tx = %tx_hex, block = receipt.block_number, "health data submitted");

        // Already on the ledger; only the refresh depends on the context
        if snapshot.is_stale() {
            self.state.set_status(IGNORE_STATUS);
            return OperationOutcome::Stale;
        }

        if self.refresh_after_submit {
            let context = snapshot.context();
            let outcome = self.handles.refresh(context.contract, context.signer).await;
            debug!(%outcome, "post-submission refresh");
        }
        OperationOutcome::Completed
    }

    fn fail(&self, error: SyncError) -> OperationOutcome {
        self.state.set_status(format!("Submission failed! {}", error));
        error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::deployment::{Deployment, DeploymentRegistry, LOCAL_CHAIN_ID};
    use crate::sim::{LiveConnection, LocalSigner, SimulatedFhe, SimulatedLedger};

    const CONTRACT: Address = Address::new([0xC0; 20]);
    const USER: Address = Address::new([0x11; 20]);

    struct Fixture {
        pipeline: SubmissionPipeline,
        ledger: Arc<SimulatedLedger>,
        connection: Arc<LiveConnection>,
        signer: Arc<LocalSigner>,
        state: Arc<SharedState>,
    }

    fn fixture() -> Fixture {
        let registry = DeploymentRegistry::from_deployments([Deployment::new(
            LOCAL_CHAIN_ID,
            "hardhat",
            CONTRACT,
        )]);
        let connection = Arc::new(LiveConnection::new(Some(LOCAL_CHAIN_ID)));
        let signer = Arc::new(LocalSigner::new(USER));
        connection.set_signer(Some(signer.clone()));
        let tracker = SessionTracker::new(connection.clone(), Arc::new(registry));

        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let fhe = Arc::new(SimulatedFhe::new(clock.clone()));
        let ledger = Arc::new(SimulatedLedger::with_store(fhe.store()));
        let state = Arc::new(SharedState::new());
        let handles = Arc::new(HandleSynchronizer::new(
            ledger.clone(),
            tracker.clone(),
            state.clone(),
        ));
        let pipeline =
            SubmissionPipeline::new(ledger.clone(), fhe, handles, tracker, state.clone(), clock);

        Fixture {
            pipeline,
            ledger,
            connection,
            signer,
            state,
        }
    }

    #[test]
    fn test_sleep_hours_to_tenths() {
        assert_eq!(HealthReading::from_hours(70, 8000, 7.55).sleep_tenths, 75);
        assert_eq!(HealthReading::from_hours(70, 8000, -1.0).sleep_tenths, 0);
        assert_eq!(HealthReading::new(1, 2, 3).as_inputs(), [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_submission_refreshes_handles() {
        let f = fixture();
        let outcome = f
            .pipeline
            .submit(HealthReading::new(72, 9000, 75), CONTRACT, f.signer.clone())
            .await;

        assert_eq!(outcome, OperationOutcome::Completed);
        assert_eq!(f.ledger.records_for(CONTRACT, USER), 1);
        assert_eq!(f.ledger.read_count(), 1);
        let handles = f.state.read().score_handles.unwrap();
        assert!(!handles.overall.is_zero());
        assert!(f.state.status().starts_with("Submission completed status=1"));
    }

    #[tokio::test]
    async fn test_account_switch_after_inclusion_skips_refresh() {
        let f = fixture();
        let connection = f.connection.clone();
        f.ledger.on_next_receipt(move || {
            connection.set_signer(Some(Arc::new(LocalSigner::new(Address::new([0x22; 20])))));
        });

        let outcome = f
            .pipeline
            .submit(HealthReading::new(72, 9000, 75), CONTRACT, f.signer.clone())
            .await;

        assert_eq!(outcome, OperationOutcome::Stale);
        assert_eq!(f.ledger.records_for(CONTRACT, USER), 1);
        assert_eq!(f.ledger.read_count(), 0);
        assert!(f.state.read().score_handles.is_none());
        assert_eq!(f.state.status(), IGNORE_STATUS);
    }

    #[tokio::test]
    async fn test_reverted_transaction_fails() {
        let f = fixture();
        f.ledger.set_reverting(true);

        let outcome = f
            .pipeline
            .submit(HealthReading::new(72, 9000, 75), CONTRACT, f.signer.clone())
            .await;

        assert!(outcome.is_failed());
        assert_eq!(f.ledger.read_count(), 0);
        assert!(f.state.status().starts_with("Submission failed!"));
        assert!(!f.state.guards().is_busy(Operation::Submit));
    }

    #[tokio::test]
    async fn test_network_failure_releases_guard() {
        let f = fixture();
        f.ledger.set_failing(true);

        let outcome = f
            .pipeline
            .submit(HealthReading::new(72, 9000, 75), CONTRACT, f.signer.clone())
            .await;

        assert!(outcome.is_failed());
        assert_eq!(f.ledger.records_for(CONTRACT, USER), 0);
        assert!(!f.state.guards().is_busy(Operation::Submit));
    }
}
