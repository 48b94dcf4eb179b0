//! Result of a top-level session operation

use crate::errors::SyncError;
use crate::session::Freshness;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a session operation ended.
///
/// Operations never return errors to the presentation layer; failures are
/// reported here and in the session status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationOutcome {
    /// Result applied to the session state
    Completed,
    /// Another call of the same category is in flight; this one was dropped
    Busy,
    /// Deployment, signer or an input handle is missing
    NotReady,
    /// The chain, signer or contract changed mid-flight; result discarded
    Stale,
    /// The operation failed; state was left as it was
    Failed(String),
}

impl OperationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, OperationOutcome::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, OperationOutcome::Failed(_))
    }
}

impl From<SyncError> for OperationOutcome {
    fn from(error: SyncError) -> Self {
        OperationOutcome::Failed(error.to_string())
    }
}

impl<T> From<Freshness<T>> for OperationOutcome {
    fn from(freshness: Freshness<T>) -> Self {
        match freshness {
            Freshness::Current(_) => OperationOutcome::Completed,
            Freshness::Stale => OperationOutcome::Stale,
        }
    }
}

impl fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationOutcome::Completed => write!(f, "completed"),
            OperationOutcome::Busy => write!(f, "busy"),
            OperationOutcome::NotReady => write!(f, "not ready"),
            OperationOutcome::Stale => write!(f, "stale, result ignored"),
            OperationOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
