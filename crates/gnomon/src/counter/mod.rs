//! Per-thread performance counter providers.
//!
//! A provider owns the kernel handles for one thread and exposes the
//! capability set `{open, reset, enable, snapshot, close}`. Two
//! implementations exist: [`PerfCounter`] reads Linux perf events, and
//! [`NullCounter`] serves every other platform — and Linux hosts where the
//! syscall is unavailable — by flagging all kernel fields unavailable.
//!
//! Wall-clock duration is measured by the provider itself from the monotonic
//! clock, so scope timing keeps working even when kernel counters degrade.

use std::fmt;

use gnomon_core::snapshot::CounterSnapshot;

#[cfg(target_os = "linux")]
mod linux;
mod noop;

#[cfg(target_os = "linux")]
pub use linux::PerfCounter;
pub use noop::NullCounter;

/// Capability set of a per-thread counter source.
///
/// Providers are thread-bound: the kernel requires that counters opened for
/// a task are read by the same task. `snapshot` takes `&mut self` because
/// read failures latch a fault on the provider.
pub trait CounterProvider: Send {
    /// Zero all counters (and the wall-clock origin).
    fn reset(&mut self);

    /// Start counting. Grouped events are activated atomically through
    /// their leader.
    fn enable(&mut self);

    /// Read every counter. Failed or fully-multiplexed fields come back
    /// flagged unavailable, never as fake zeroes.
    fn snapshot(&mut self) -> CounterSnapshot;

    /// Release kernel handles, in reverse open order. Idempotent.
    fn close(&mut self);

    /// Most recent fault, latched at open or read time. Yields each fault at
    /// most once so callers can report without flooding.
    fn take_fault(&mut self) -> Option<CounterFault>;
}

/// A failed counter operation, kept for one-shot reporting.
#[derive(Clone, Debug)]
pub struct CounterFault {
    /// Which operation failed: "open", "read", "ioctl".
    pub operation: &'static str,
    /// Canonical name of the counter involved.
    pub counter: &'static str,
    pub detail: String,
}

impl fmt::Display for CounterFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "perf {} failed for {}: {}",
            self.operation, self.counter, self.detail
        )
    }
}

impl std::error::Error for CounterFault {}

/// Open the best provider for the calling thread.
///
/// On Linux this opens the full perf event set; any kernel error degrades to
/// the no-op provider carrying the fault for later reporting. Other
/// platforms always get the no-op provider.
pub fn open_provider() -> Box<dyn CounterProvider> {
    #[cfg(target_os = "linux")]
    {
        return match PerfCounter::open() {
            Ok(counter) => Box::new(counter),
            Err(fault) => {
                tracing::debug!(%fault, "perf events unavailable, degrading to no-op counters");
                Box::new(NullCounter::with_fault(fault))
            }
        };
    }
    #[allow(unreachable_code)]
    Box::new(NullCounter::new())
}
