//! Batch Decryption Orchestrator
//!
//! Turns a group of handles into clear values in one user-decryption round
//! trip. The session context is checked after the authorization is obtained
//! and again after the decrypt call returns, since either step can be
//! overtaken by an account or network switch.

use crate::authorization::AuthorizationCache;
use crate::errors::SyncError;
use crate::fhe::{DecryptionCapability, HandleContractPair, UserDecryptRequest};
use crate::guard::Operation;
use crate::ledger::Signer;
use crate::normalize::normalize_wire;
use crate::outcome::OperationOutcome;
use crate::session::SessionTracker;
use crate::state::SharedState;
use crate::types::{Address, ClearScalar, ClearValue, EncryptedHandle, MetricField};
use std::sync::Arc;
use tracing::{debug, info, warn};

const IGNORE_STATUS: &str = "Ignore FHEVM decryption";

pub struct BatchDecryptor {
    fhe: Arc<dyn DecryptionCapability>,
    authorizations: Arc<AuthorizationCache>,
    tracker: SessionTracker,
    state: Arc<SharedState>,
}

impl BatchDecryptor {
    pub fn new(
        fhe: Arc<dyn DecryptionCapability>,
        authorizations: Arc<AuthorizationCache>,
        tracker: SessionTracker,
        state: Arc<SharedState>,
    ) -> Self {
        Self {
            fhe,
            authorizations,
            tracker,
            state,
        }
    }

    /// Decrypt `handles` of one field group owned by `contract`.
    ///
    /// Zero handles are skipped. Fields missing from the response keep their
    /// previous clear value. Signed fields are normalized from their 32-bit
    /// wire form.
    pub async fn decrypt<F: MetricField>(
        &self,
        handles: &[(F, EncryptedHandle)],
        contract: Address,
        signer: Arc<dyn Signer>,
    ) -> OperationOutcome {
        let Some(_in_flight) = self.state.guards().try_acquire(F::GROUP) else {
            debug!(group = %F::GROUP, "decryption already in flight");
            return OperationOutcome::Busy;
        };

        let snapshot = self.tracker.snapshot();

        let requested: Vec<(F, EncryptedHandle)> = handles
            .iter()
            .copied()
            .filter(|(_, handle)| !handle.is_zero())
            .collect();

        if requested.is_empty() {
            if snapshot.is_stale() {
                return OperationOutcome::Stale;
            }
            self.state.update(|s| F::clear_values(s).clear());
            return OperationOutcome::Completed;
        }

        self.state.set_status("Start decrypting...");

        let user = signer.address();
        let Some(authorization) = self
            .authorizations
            .load_or_sign(&[contract], user, signer.as_ref())
            .await
        else {
            self.state
                .set_status("Unable to build FHEVM decryption signature");
            return SyncError::AuthorizationUnavailable.into();
        };

        if snapshot.is_stale() {
            self.state.set_status(IGNORE_STATUS);
            return OperationOutcome::Stale;
        }

        self.state.set_status("Call FHEVM userDecrypt...");
        let request = UserDecryptRequest {
            handles: requested
                .iter()
                .map(|(_, handle)| HandleContractPair {
                    handle: *handle,
                    contract_address: contract,
                })
                .collect(),
            authorization,
        };

        let values = match self.fhe.user_decrypt(&request).await {
            Ok(values) => values,
            Err(e) => {
                self.state
                    .set_status(format!("{} {}", failure_prefix(F::GROUP), e));
                return e.into();
            }
        };

        if snapshot.is_stale() {
            self.state.set_status(IGNORE_STATUS);
            return OperationOutcome::Stale;
        }

        let mut applied = 0usize;
        self.state.update(|s| {
            let clear = F::clear_values(s);
            for (field, handle) in &requested {
                let Some(raw) = values.get(handle) else {
                    debug!(field = field.name(), handle = %handle.short(), "no value returned");
                    continue;
                };
                let Some(value) = to_domain(*field, *raw) else {
                    warn!(field = field.name(), value = %raw, "value does not fit a signed 32-bit field");
                    continue;
                };
                clear.set(
                    *field,
                    ClearValue {
                        handle: *handle,
                        value,
                    },
                );
                applied += 1;
            }
        });

        info!(
            group = %F::GROUP,
            requested = requested.len(),
            applied,
            "decryption applied"
        );
        self.state.set_status(completed_status(F::GROUP));
        OperationOutcome::Completed
    }
}

/// Map a decrypted wire value into the field's domain
fn to_domain<F: MetricField>(field: F, raw: ClearScalar) -> Option<ClearScalar> {
    if !field.is_signed() {
        return Some(raw);
    }
    match raw {
        ClearScalar::Uint(v) => normalize_wire(v).map(|n| ClearScalar::Int(i64::from(n))),
        ClearScalar::Int(v) => Some(ClearScalar::Int(v)),
        ClearScalar::Bool(_) => None,
    }
}

fn completed_status(group: Operation) -> &'static str {
    match group {
        Operation::DecryptTimeSeries => "Time series stats decrypted!",
        _ => "FHEVM userDecrypt completed!",
    }
}

fn failure_prefix(group: Operation) -> &'static str {
    match group {
        Operation::DecryptTimeSeries => "Time series decryption failed!",
        _ => "FHEVM userDecrypt failed!",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{AuthorizationConfig, InMemoryAuthorizationStorage};
    use crate::clock::ManualClock;
    use crate::deployment::{Deployment, DeploymentRegistry, LOCAL_CHAIN_ID, SEPOLIA_CHAIN_ID};
    use crate::errors::SyncResult;
    use crate::fhe::{DecryptedValues, EncryptedInputs, EphemeralKeypair};
    use crate::sim::{LiveConnection, LocalSigner, SimulatedFhe};
    use crate::types::{ScoreField, TimeSeriesField};
    use async_trait::async_trait;

    const CONTRACT: Address = Address::new([0xC0; 20]);
    const USER: Address = Address::new([0x11; 20]);

    /// Switches the wallet to another chain while the decrypt call is pending.
    struct ChainSwitchingFhe {
        inner: Arc<SimulatedFhe>,
        connection: Arc<LiveConnection>,
    }

    #[async_trait]
    impl DecryptionCapability for ChainSwitchingFhe {
        fn generate_keypair(&self) -> EphemeralKeypair {
            self.inner.generate_keypair()
        }

        async fn encrypt_inputs(
            &self,
            contract: Address,
            user: Address,
            values: &[u32],
        ) -> SyncResult<EncryptedInputs> {
            self.inner.encrypt_inputs(contract, user, values).await
        }

        async fn user_decrypt(&self, request: &UserDecryptRequest) -> SyncResult<DecryptedValues> {
            let values = self.inner.user_decrypt(request).await;
            self.connection.set_chain_id(Some(SEPOLIA_CHAIN_ID));
            values
        }
    }

    struct Fixture {
        fhe: Arc<SimulatedFhe>,
        connection: Arc<LiveConnection>,
        signer: Arc<LocalSigner>,
        tracker: SessionTracker,
        state: Arc<SharedState>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = DeploymentRegistry::from_deployments([
                Deployment::new(LOCAL_CHAIN_ID, "hardhat", CONTRACT),
                Deployment::new(SEPOLIA_CHAIN_ID, "sepolia", Address::new([0xC1; 20])),
            ]);
            let connection = Arc::new(LiveConnection::new(Some(LOCAL_CHAIN_ID)));
            let signer = Arc::new(LocalSigner::new(USER));
            connection.set_signer(Some(signer.clone()));
            let clock = Arc::new(ManualClock::new(1_700_000_000));

            Self {
                fhe: Arc::new(SimulatedFhe::new(clock.clone())),
                tracker: SessionTracker::new(connection.clone(), Arc::new(registry)),
                connection,
                signer,
                state: Arc::new(SharedState::new()),
                clock,
            }
        }

        fn decryptor_with(&self, fhe: Arc<dyn DecryptionCapability>) -> BatchDecryptor {
            let cache = Arc::new(AuthorizationCache::new(
                AuthorizationConfig::default(),
                Arc::new(InMemoryAuthorizationStorage::new()),
                fhe.clone(),
                self.clock.clone(),
            ));
            BatchDecryptor::new(fhe, cache, self.tracker.clone(), self.state.clone())
        }

        fn decryptor(&self) -> BatchDecryptor {
            self.decryptor_with(self.fhe.clone())
        }

        fn score_handles(&self) -> Vec<(ScoreField, EncryptedHandle)> {
            let scores = [
                (ScoreField::Overall, 0xAA, 82),
                (ScoreField::Cardio, 0xBB, 90),
                (ScoreField::Activity, 0xCC, 75),
                (ScoreField::Sleep, 0xDD, 88),
            ];
            scores
                .iter()
                .map(|(field, byte, value)| {
                    let handle = EncryptedHandle::new([*byte; 32]);
                    self.fhe
                        .store()
                        .insert(handle, CONTRACT, ClearScalar::Uint(*value), &[USER]);
                    (*field, handle)
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn test_scores_are_tagged_with_source_handle() {
        let f = Fixture::new();
        let handles = f.score_handles();

        let outcome = f.decryptor().decrypt(&handles, CONTRACT, f.signer.clone()).await;
        assert_eq!(outcome, OperationOutcome::Completed);

        let state = f.state.read();
        for ((field, handle), expected) in handles.iter().zip([82u64, 90, 75, 88]) {
            let clear = state.score_clear.get(*field).unwrap();
            assert_eq!(clear.handle, *handle);
            assert_eq!(clear.value, ClearScalar::Uint(expected));
        }
        assert_eq!(f.state.status(), "FHEVM userDecrypt completed!");
    }

    #[tokio::test]
    async fn test_zero_handles_clear_group() {
        let f = Fixture::new();
        let handles = f.score_handles();
        let decryptor = f.decryptor();
        decryptor.decrypt(&handles, CONTRACT, f.signer.clone()).await;

        let zero = [(ScoreField::Overall, EncryptedHandle::ZERO)];
        let outcome = decryptor.decrypt(&zero, CONTRACT, f.signer.clone()).await;

        assert_eq!(outcome, OperationOutcome::Completed);
        assert!(f.state.read().score_clear.is_empty());
        assert_eq!(f.signer.sign_count(), 1);
    }

    #[tokio::test]
    async fn test_declined_signature_leaves_values() {
        let f = Fixture::new();
        let handles = f.score_handles();
        f.signer.set_declining(true);

        let outcome = f.decryptor().decrypt(&handles, CONTRACT, f.signer.clone()).await;

        assert!(outcome.is_failed());
        assert!(f.state.read().score_clear.is_empty());
        assert_eq!(f.state.status(), "Unable to build FHEVM decryption signature");
        assert_eq!(f.fhe.decrypt_calls(), 0);
    }

    #[tokio::test]
    async fn test_chain_switch_during_decrypt_discards_values() {
        let f = Fixture::new();
        let handles = f.score_handles();
        let switching = Arc::new(ChainSwitchingFhe {
            inner: f.fhe.clone(),
            connection: f.connection.clone(),
        });

        let outcome = f
            .decryptor_with(switching)
            .decrypt(&handles, CONTRACT, f.signer.clone())
            .await;

        assert_eq!(outcome, OperationOutcome::Stale);
        assert!(f.state.read().score_clear.is_empty());
        assert_eq!(f.state.status(), IGNORE_STATUS);
        assert_eq!(f.fhe.decrypt_calls(), 1);
    }

    #[tokio::test]
    async fn test_partial_response_keeps_previous_value() {
        let f = Fixture::new();
        let handles = f.score_handles();
        let decryptor = f.decryptor();
        decryptor.decrypt(&handles, CONTRACT, f.signer.clone()).await;

        // New cardio handle that the backend does not return
        let withheld = EncryptedHandle::new([0xBC; 32]);
        f.fhe
            .store()
            .insert(withheld, CONTRACT, ClearScalar::Uint(10), &[USER]);
        f.fhe.withhold(withheld);

        let mut next = handles.clone();
        next[1] = (ScoreField::Cardio, withheld);
        let outcome = decryptor.decrypt(&next, CONTRACT, f.signer.clone()).await;

        assert_eq!(outcome, OperationOutcome::Completed);
        let state = f.state.read();
        let cardio = state.score_clear.get(ScoreField::Cardio).unwrap();
        assert_eq!(cardio.value, ClearScalar::Uint(90));
        assert_eq!(cardio.handle, handles[1].1);
        assert_eq!(state.score_clear.current(ScoreField::Cardio, &withheld), None);
    }

    #[tokio::test]
    async fn test_trend_is_normalized() {
        let f = Fixture::new();
        let trend = EncryptedHandle::new([0x71; 32]);
        let avg = EncryptedHandle::new([0x72; 32]);
        f.fhe
            .store()
            .insert(trend, CONTRACT, ClearScalar::Uint(4_294_967_295), &[USER]);
        f.fhe
            .store()
            .insert(avg, CONTRACT, ClearScalar::Uint(4_294_967_295), &[USER]);

        let handles = [
            (TimeSeriesField::TrendHeartRate, trend),
            (TimeSeriesField::AvgHeartRate, avg),
        ];
        let outcome = f.decryptor().decrypt(&handles, CONTRACT, f.signer.clone()).await;

        assert_eq!(outcome, OperationOutcome::Completed);
        let state = f.state.read();
        assert_eq!(
            state
                .time_series_clear
                .current(TimeSeriesField::TrendHeartRate, &trend),
            Some(ClearScalar::Int(-1))
        );
        assert_eq!(
            state
                .time_series_clear
                .current(TimeSeriesField::AvgHeartRate, &avg),
            Some(ClearScalar::Uint(4_294_967_295))
        );
    }

    #[test]
    fn test_wide_trend_is_skipped() {
        assert_eq!(
            to_domain(TimeSeriesField::TrendSteps, ClearScalar::Uint(1 << 40)),
            None
        );
        assert_eq!(
            to_domain(ScoreField::AnomalyFlag, ClearScalar::Bool(true)),
            Some(ClearScalar::Bool(true))
        );
    }
}
