//! No-op counter provider.

use std::time::Instant;

use gnomon_core::snapshot::{CounterKind, CounterSnapshot};

use super::{CounterFault, CounterProvider};

/// Provider for hosts without usable kernel counters.
///
/// Snapshots carry a live wall-clock reading; every kernel field is zero and
/// flagged unavailable. Downstream aggregation treats this as a supported
/// configuration, not an error.
#[derive(Debug)]
pub struct NullCounter {
    origin: Instant,
    fault: Option<CounterFault>,
}

impl NullCounter {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            fault: None,
        }
    }

    /// No-op provider standing in for a failed kernel provider; the fault is
    /// reported once through `take_fault`.
    pub(crate) fn with_fault(fault: CounterFault) -> Self {
        Self {
            origin: Instant::now(),
            fault: Some(fault),
        }
    }
}

impl Default for NullCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterProvider for NullCounter {
    fn reset(&mut self) {
        self.origin = Instant::now();
    }

    fn enable(&mut self) {}

    fn snapshot(&mut self) -> CounterSnapshot {
        let mut snapshot = CounterSnapshot::unavailable();
        snapshot.set(
            CounterKind::WallDuration,
            self.origin.elapsed().as_nanos() as u64,
        );
        snapshot
    }

    fn close(&mut self) {}

    fn take_fault(&mut self) -> Option<CounterFault> {
        self.fault.take()
    }
}
