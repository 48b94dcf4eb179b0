//! Aggregate Query Trigger
//!
//! Time-series statistics are computed by a transaction, not a read. The new
//! handles come back in a `TimeSeriesStatsResult` event of the receipt and
//! replace the stored bundle as a whole.

use crate::errors::SyncError;
use crate::events::find_time_series_event;
use crate::guard::Operation;
use crate::ledger::{HealthLedger, Signer};
use crate::outcome::OperationOutcome;
use crate::session::SessionTracker;
use crate::state::SharedState;
use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Offset of the far-future end used for "all records"
pub const ALL_RECORDS_HORIZON: u64 = 1_000_000_000;

/// Timestamp range `[start, end]` of an aggregate query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateWindow {
    pub start: u64,
    pub end: u64,
}

impl AggregateWindow {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Window covering every record up to far beyond `now`
    pub fn all_records(now: u64) -> Self {
        Self {
            start: 0,
            end: now.saturating_add(ALL_RECORDS_HORIZON),
        }
    }
}

pub struct AggregateQuery {
    ledger: Arc<dyn HealthLedger>,
    tracker: SessionTracker,
    state: Arc<SharedState>,
}

impl AggregateQuery {
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

    /// Run the aggregate for `user` over `window` and store the resulting
    /// handle bundle.
    pub async fn fetch(
        &self,
        user: Address,
        window: AggregateWindow,
        contract: Address,
        signer: Arc<dyn Signer>,
    ) -> OperationOutcome {
        let Some(_in_flight) = self.state.guards().try_acquire(Operation::FetchTimeSeries) else {
            debug!("time series fetch already in flight");
            return OperationOutcome::Busy;
        };

        let snapshot = self.tracker.snapshot();
        self.state.set_status("Fetching time series stats...");

        let tx_hash = match self
            .ledger
            .query_time_series_stats(contract, signer.address(), user, window.start, window.end)
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

        if snapshot.is_stale() {
            self.state.set_status("Ignore time series stats fetch");
            return OperationOutcome::Stale;
        }
        if !receipt.success {
            return self.fail(SyncError::Reverted(tx_hex));
        }

        match find_time_series_event(&receipt, contract) {
            Ok(event) => {
                info!(
                    tx = %tx_hex,
                    start = window.start,
                    end = window.end,
                    "time series handles received"
                );
                self.state
                    .update(|s| s.time_series_handles = Some(event.handles));
                self.state.set_status("Time series stats fetched successfully!");
                OperationOutcome::Completed
            }
            Err(e @ SyncError::EventNotFound(_)) => {
                self.state
                    .set_status("TimeSeriesStatsResult event not found in transaction receipt");
                e.into()
            }
            Err(e) => {
                debug!("aggregate event decode failed: {}", e);
                self.state
                    .set_status("Failed to parse TimeSeriesStatsResult event");
                e.into()
            }
        }
    }

    fn fail(&self, error: SyncError) -> OperationOutcome {
        self.state
            .set_status(format!("getTimeSeriesStats() call failed! error={}", error));
        error.into()
    }
}
