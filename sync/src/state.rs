//! Shared synchronization state
//!
//! Handles and clear values are written only by the operation that owns them
//! and only after a staleness check. Readers see whole values, never partially
//! updated bundles.

use crate::guard::OperationGuards;
use crate::types::{
    ClearScalar, ClearValue, EncryptedHandle, MetricField, ScoreField, ScoreHandles,
    TimeSeriesAggregateHandles, TimeSeriesField,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Clear values of one field group, each tagged with its source handle.
#[derive(Debug, Clone)]
pub struct ClearValues<F: MetricField> {
    values: HashMap<F, ClearValue>,
}

impl<F: MetricField> Default for ClearValues<F> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
        }
    }
}

impl<F: MetricField> ClearValues<F> {
    pub fn get(&self, field: F) -> Option<&ClearValue> {
        self.values.get(&field)
    }

    /// The value for `field` only if it was decrypted from `latest`
    pub fn current(&self, field: F, latest: &EncryptedHandle) -> Option<ClearScalar> {
        self.values
            .get(&field)
            .filter(|v| v.is_current_for(latest))
            .map(|v| v.value)
    }

    pub fn set(&mut self, field: F, value: ClearValue) {
        self.values.insert(field, value);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Everything the session has learned from the ledger and the backend.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub score_handles: Option<ScoreHandles>,
    pub score_clear: ClearValues<ScoreField>,
    pub time_series_handles: Option<TimeSeriesAggregateHandles>,
    pub time_series_clear: ClearValues<TimeSeriesField>,
}

/// State shared by every operation of one session.
#[derive(Debug)]
pub struct SharedState {
    state: RwLock<SyncState>,
    status: RwLock<String>,
    guards: Arc<OperationGuards>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SyncState::default()),
            status: RwLock::new(String::new()),
            guards: Arc::new(OperationGuards::new()),
        }
    }

    pub fn guards(&self) -> &Arc<OperationGuards> {
        &self.guards
    }

    /// Copy of the current state
    pub fn read(&self) -> SyncState {
        self.state.read().clone()
    }

    /// Run `f` with exclusive access
    pub fn update<R>(&self, f: impl FnOnce(&mut SyncState) -> R) -> R {
        f(&mut self.state.write())
    }

    pub fn status(&self) -> String {
        self.status.read().clone()
    }

    /// Replace the user-facing status message
    pub fn set_status(&self, message: impl Into<String>) {
        let message = message.into();
        info!(status = %message);
        *self.status.write() = message;
    }

    pub fn clear_status(&self) {
        self.status.write().clear();
    }
}
