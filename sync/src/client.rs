//! Health session: the sync core facade
//!
//! Wires the components to one wallet connection and exposes the operations
//! and derived views the presentation layer consumes.

use crate::aggregate::{AggregateQuery, AggregateWindow};
use crate::authorization::{
    AuthorizationCache, AuthorizationConfig, AuthorizationStorage, InMemoryAuthorizationStorage,
    DEFAULT_DURATION_DAYS,
};
use crate::clock::{Clock, SystemClock};
use crate::decrypt::BatchDecryptor;
use crate::deployment::{Deployment, DeploymentRegistry};
use crate::errors::{SyncError, SyncResult};
use crate::fhe::DecryptionCapability;
use crate::guard::Operation;
use crate::handles::HandleSynchronizer;
use crate::ledger::{HealthLedger, Signer};
use crate::outcome::OperationOutcome;
use crate::session::{ConnectionState, SessionTracker};
use crate::state::{SharedState, SyncState};
use crate::submit::{HealthReading, SubmissionPipeline};
use crate::types::{
    Address, ClearScalar, ScoreField, ScoreHandles, TimeSeriesAggregateHandles, TimeSeriesField,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Validity of newly signed decryption authorizations (days)
    pub authorization_duration_days: u32,
    /// Re-read score handles after a successful submission
    pub refresh_after_submit: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            authorization_duration_days: DEFAULT_DURATION_DAYS,
            refresh_after_submit: true,
        }
    }
}

/// One user's encrypted health session.
pub struct HealthSession {
    config: SessionConfig,
    tracker: SessionTracker,
    state: Arc<SharedState>,
    ledger: Arc<dyn HealthLedger>,
    clock: Arc<dyn Clock>,
    authorizations: Arc<AuthorizationCache>,
    handles: Arc<HandleSynchronizer>,
    decryptor: BatchDecryptor,
    submitter: SubmissionPipeline,
    aggregate: AggregateQuery,
}

impl HealthSession {
    pub fn builder() -> HealthSessionBuilder {
        HealthSessionBuilder::new()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn authorizations(&self) -> &AuthorizationCache {
        &self.authorizations
    }

    /// Current status message
    pub fn status(&self) -> String {
        self.state.status()
    }

    /// Copy of the raw handle and clear-value state
    pub fn state(&self) -> SyncState {
        self.state.read()
    }

    /// Resolve the deployment for the current chain and update the status
    /// message accordingly. Call after the wallet switches chains.
    pub fn check_deployment(&self) -> Option<Deployment> {
        let deployment = self.tracker.deployment();
        match (self.tracker.chain_id(), &deployment) {
            (Some(chain_id), None) => self.state.set_status(format!(
                "HealthAnalyzer deployment not found for chainId={}.",
                chain_id
            )),
            _ => self.state.clear_status(),
        }
        deployment
    }

    /// Re-read score handles for the connected account.
    pub async fn refresh_scores(&self) -> OperationOutcome {
        self.handles
            .refresh(self.tracker.contract_address(), self.tracker.signer_address())
            .await
    }

    /// Decrypt the score set and anomaly flag.
    pub async fn decrypt_scores(&self) -> OperationOutcome {
        if self.is_refreshing() {
            return OperationOutcome::Busy;
        }
        let Some((contract, signer)) = self.ready() else {
            return OperationOutcome::NotReady;
        };

        let state = self.state.read();
        let handles = match state.score_handles {
            Some(handles) if !handles.overall.is_zero() => handles,
            _ => {
                self.state.update(|s| s.score_clear.clear());
                return OperationOutcome::Completed;
            }
        };
        if state
            .score_clear
            .current(ScoreField::Overall, &handles.overall)
            .is_some()
        {
            debug!("scores already decrypted for the current handles");
            return OperationOutcome::Completed;
        }

        self.decryptor
            .decrypt(&handles.entries(), contract, signer)
            .await
    }

    /// Encrypt and submit one reading.
    pub async fn submit_health_data(&self, reading: HealthReading) -> OperationOutcome {
        if self.is_refreshing() {
            return OperationOutcome::Busy;
        }
        let Some((contract, signer)) = self.ready() else {
            return OperationOutcome::NotReady;
        };
        self.submitter.submit(reading, contract, signer).await
    }

    /// Run the aggregate query for the connected account over `window`.
    pub async fn fetch_time_series_stats(&self, window: AggregateWindow) -> OperationOutcome {
        let Some((contract, signer)) = self.ready() else {
            return OperationOutcome::NotReady;
        };
        let user = signer.address();
        self.aggregate.fetch(user, window, contract, signer).await
    }

    /// Aggregate over every record of the connected account
    pub async fn fetch_all_time_series_stats(&self) -> OperationOutcome {
        let window = AggregateWindow::all_records(self.clock.now_secs());
        self.fetch_time_series_stats(window).await
    }

    /// Decrypt the latest aggregate bundle.
    pub async fn decrypt_time_series_stats(&self) -> OperationOutcome {
        let Some((contract, signer)) = self.ready() else {
            return OperationOutcome::NotReady;
        };
        let Some(bundle) = self.state.read().time_series_handles else {
            return OperationOutcome::NotReady;
        };
        self.decryptor
            .decrypt(&bundle.entries(), contract, signer)
            .await
    }

    /// Number of records stored for the connected account
    pub async fn record_count(&self) -> Option<u64> {
        let (contract, signer) = self.ready()?;
        match self
            .ledger
            .get_record_count(contract, signer.address())
            .await
        {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("record count read failed: {}", e);
                self.state
                    .set_status(format!("HealthAnalyzer.getRecordCount() call failed! error={}", e));
                None
            }
        }
    }

    /// Contract and signer an operation runs against
    fn target(&self) -> SyncResult<(Address, Arc<dyn Signer>)> {
        let contract = self
            .tracker
            .contract_address()
            .ok_or_else(|| SyncError::NotDeployed(self.tracker.chain_id().unwrap_or_default()))?;
        let signer = self.tracker.signer().ok_or(SyncError::NoSigner)?;
        Ok((contract, signer))
    }

    fn ready(&self) -> Option<(Address, Arc<dyn Signer>)> {
        match self.target() {
            Ok(target) => Some(target),
            Err(e) => {
                debug!("operation not ready: {}", e);
                None
            }
        }
    }

    fn busy(&self, operation: Operation) -> bool {
        self.state.guards().is_busy(operation)
    }

    pub fn is_deployed(&self) -> bool {
        self.tracker.contract_address().is_some()
    }

    pub fn is_refreshing(&self) -> bool {
        self.busy(Operation::Refresh)
    }

    pub fn is_decrypting(&self) -> bool {
        self.busy(Operation::DecryptScores)
    }

    pub fn is_submitting(&self) -> bool {
        self.busy(Operation::Submit)
    }

    pub fn is_fetching_time_series(&self) -> bool {
        self.busy(Operation::FetchTimeSeries)
    }

    pub fn is_decrypting_time_series(&self) -> bool {
        self.busy(Operation::DecryptTimeSeries)
    }

    /// The overall score shown is the one for the latest overall handle
    pub fn is_decrypted(&self) -> bool {
        let state = self.state.read();
        state
            .score_handles
            .map(|h| {
                state
                    .score_clear
                    .current(ScoreField::Overall, &h.overall)
                    .is_some()
            })
            .unwrap_or(false)
    }

    pub fn can_refresh(&self) -> bool {
        self.is_deployed() && !self.is_refreshing()
    }

    pub fn can_decrypt(&self) -> bool {
        let has_new_overall = self
            .state
            .read()
            .score_handles
            .map(|h| !h.overall.is_zero())
            .unwrap_or(false);
        self.target().is_ok()
            && !self.is_refreshing()
            && !self.is_decrypting()
            && has_new_overall
            && !self.is_decrypted()
    }

    pub fn can_submit(&self) -> bool {
        self.target().is_ok() && !self.is_refreshing() && !self.is_submitting()
    }

    pub fn can_fetch_time_series(&self) -> bool {
        self.target().is_ok() && !self.is_fetching_time_series()
    }

    pub fn can_decrypt_time_series(&self) -> bool {
        let has_values = self
            .state
            .read()
            .time_series_handles
            .map(|h| h.has_any_value())
            .unwrap_or(false);
        self.target().is_ok() && !self.is_decrypting_time_series() && has_values
    }

    pub fn flags(&self) -> ReadinessFlags {
        ReadinessFlags {
            is_deployed: self.is_deployed(),
            is_decrypted: self.is_decrypted(),
            can_refresh: self.can_refresh(),
            can_decrypt: self.can_decrypt(),
            can_submit: self.can_submit(),
            can_fetch_time_series: self.can_fetch_time_series(),
            can_decrypt_time_series: self.can_decrypt_time_series(),
            is_refreshing: self.is_refreshing(),
            is_decrypting: self.is_decrypting(),
            is_submitting: self.is_submitting(),
            is_fetching_time_series: self.is_fetching_time_series(),
            is_decrypting_time_series: self.is_decrypting_time_series(),
        }
    }

    /// Snapshot for presentation. Clear values whose tag no longer matches
    /// the latest handle are left out.
    pub fn view(&self) -> SessionView {
        let state = self.state.read();

        let scores = state
            .score_handles
            .map(|handles| {
                handles
                    .entries()
                    .into_iter()
                    .filter_map(|(field, handle)| {
                        state.score_clear.current(field, &handle).map(|v| (field, v))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let time_series = state
            .time_series_handles
            .map(|handles| {
                handles
                    .entries()
                    .into_iter()
                    .filter_map(|(field, handle)| {
                        state
                            .time_series_clear
                            .current(field, &handle)
                            .map(|v| (field, v))
                    })
                    .collect()
            })
            .unwrap_or_default();

        SessionView {
            chain_id: self.tracker.chain_id(),
            contract: self.tracker.contract_address(),
            user: self.tracker.signer_address(),
            score_handles: state.score_handles,
            scores,
            time_series_handles: state.time_series_handles,
            time_series,
            flags: self.flags(),
            status: self.state.status(),
        }
    }
}

/// Readiness and busy flags, each derived from the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessFlags {
    pub is_deployed: bool,
    pub is_decrypted: bool,
    pub can_refresh: bool,
    pub can_decrypt: bool,
    pub can_submit: bool,
    pub can_fetch_time_series: bool,
    pub can_decrypt_time_series: bool,
    pub is_refreshing: bool,
    pub is_decrypting: bool,
    pub is_submitting: bool,
    pub is_fetching_time_series: bool,
    pub is_decrypting_time_series: bool,
}

/// Immutable view of a session for the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub chain_id: Option<u64>,
    pub contract: Option<Address>,
    pub user: Option<Address>,
    pub score_handles: Option<ScoreHandles>,
    /// Only values decrypted from the current handles
    pub scores: BTreeMap<ScoreField, ClearScalar>,
    pub time_series_handles: Option<TimeSeriesAggregateHandles>,
    pub time_series: BTreeMap<TimeSeriesField, ClearScalar>,
    pub flags: ReadinessFlags,
    pub status: String,
}

/// Builder for a [`HealthSession`]
pub struct HealthSessionBuilder {
    config: SessionConfig,
    registry: DeploymentRegistry,
    connection: Option<Arc<dyn ConnectionState>>,
    ledger: Option<Arc<dyn HealthLedger>>,
    fhe: Option<Arc<dyn DecryptionCapability>>,
    storage: Option<Arc<dyn AuthorizationStorage>>,
    clock: Option<Arc<dyn Clock>>,
}

impl HealthSessionBuilder {
    /// Create a new builder with default config
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            registry: DeploymentRegistry::new(),
            connection: None,
            ledger: None,
            fhe: None,
            storage: None,
            clock: None,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set authorization validity in days
    pub fn authorization_duration_days(mut self, days: u32) -> Self {
        self.config.authorization_duration_days = days;
        self
    }

    /// Set whether submissions trigger a refresh
    pub fn refresh_after_submit(mut self, enabled: bool) -> Self {
        self.config.refresh_after_submit = enabled;
        self
    }

    pub fn deployments(mut self, registry: DeploymentRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Add one deployment
    pub fn deployment(mut self, deployment: Deployment) -> Self {
        self.registry.insert(deployment);
        self
    }

    pub fn connection(mut self, connection: Arc<dyn ConnectionState>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn HealthLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn decryption(mut self, fhe: Arc<dyn DecryptionCapability>) -> Self {
        self.fhe = Some(fhe);
        self
    }

    /// Persistent authorization store; in-memory if unset
    pub fn authorization_storage(mut self, storage: Arc<dyn AuthorizationStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Time source; wall clock if unset
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> SyncResult<HealthSession> {
        if self.config.authorization_duration_days == 0 {
            return Err(SyncError::Configuration(
                "authorization_duration_days must be at least 1".into(),
            ));
        }
        let connection = self
            .connection
            .ok_or_else(|| SyncError::Configuration("connection is required".into()))?;
        let ledger = self
            .ledger
            .ok_or_else(|| SyncError::Configuration("ledger is required".into()))?;
        let fhe = self
            .fhe
            .ok_or_else(|| SyncError::Configuration("decryption capability is required".into()))?;
        let storage = self.storage.unwrap_or_else(|| {
            Arc::new(InMemoryAuthorizationStorage::new()) as Arc<dyn AuthorizationStorage>
        });
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let tracker = SessionTracker::new(connection, Arc::new(self.registry));
        let state = Arc::new(SharedState::new());
        let authorizations = Arc::new(AuthorizationCache::new(
            AuthorizationConfig {
                duration_days: self.config.authorization_duration_days,
            },
            storage,
            fhe.clone(),
            clock.clone(),
        ));
        let handles = Arc::new(HandleSynchronizer::new(
            ledger.clone(),
            tracker.clone(),
            state.clone(),
        ));
        let decryptor = BatchDecryptor::new(
            fhe.clone(),
            authorizations.clone(),
            tracker.clone(),
            state.clone(),
        );
        let submitter = SubmissionPipeline::new(
            ledger.clone(),
            fhe,
            handles.clone(),
            tracker.clone(),
            state.clone(),
            clock.clone(),
        )
        .with_refresh_after_submit(self.config.refresh_after_submit);
        let aggregate = AggregateQuery::new(ledger.clone(), tracker.clone(), state.clone());

        Ok(HealthSession {
            config: self.config,
            tracker,
            state,
            ledger,
            clock,
            authorizations,
            handles,
            decryptor,
            submitter,
            aggregate,
        })
    }
}

impl Default for HealthSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
