//! Per-category in-flight guards
//!
//! At most one operation of each category runs at a time. A second call while
//! one is pending is dropped, not queued.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Logical operation categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Refresh,
    DecryptScores,
    DecryptTimeSeries,
    Submit,
    FetchTimeSeries,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Refresh,
        Operation::DecryptScores,
        Operation::DecryptTimeSeries,
        Operation::Submit,
        Operation::FetchTimeSeries,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Refresh => "refresh",
            Operation::DecryptScores => "decrypt-scores",
            Operation::DecryptTimeSeries => "decrypt-timeseries",
            Operation::Submit => "submit",
            Operation::FetchTimeSeries => "fetch-timeseries",
        };
        f.write_str(name)
    }
}

/// Busy flags for every operation category.
#[derive(Debug, Default)]
pub struct OperationGuards {
    busy: [AtomicBool; 5],
}

impl OperationGuards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the category, or `None` if an instance is already in flight
    pub fn try_acquire(self: &Arc<Self>, operation: Operation) -> Option<InFlight> {
        self.busy[operation.index()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight {
                guards: Arc::clone(self),
                operation,
            })
    }

    pub fn is_busy(&self, operation: Operation) -> bool {
        self.busy[operation.index()].load(Ordering::Acquire)
    }
}

/// Held for the lifetime of one operation; releases its category on drop.
#[derive(Debug)]
pub struct InFlight {
    guards: Arc<OperationGuards>,
    operation: Operation,
}

impl InFlight {
    pub fn operation(&self) -> Operation {
        self.operation
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.guards.busy[self.operation.index()].store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let guards = Arc::new(OperationGuards::new());

        let first = guards.try_acquire(Operation::Refresh);
        assert!(first.is_some());
        assert!(guards.is_busy(Operation::Refresh));
        assert!(guards.try_acquire(Operation::Refresh).is_none());

        drop(first);
        assert!(!guards.is_busy(Operation::Refresh));
        assert!(guards.try_acquire(Operation::Refresh).is_some());
    }

    #[test]
    fn test_categories_are_independent() {
        let guards = Arc::new(OperationGuards::new());

        let _refresh = guards.try_acquire(Operation::Refresh).unwrap();
        let _submit = guards.try_acquire(Operation::Submit).unwrap();

        assert!(guards.is_busy(Operation::Submit));
        assert!(!guards.is_busy(Operation::DecryptScores));
        assert!(guards.try_acquire(Operation::DecryptTimeSeries).is_some());
    }
}
