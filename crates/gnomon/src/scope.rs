//! Per-thread scope tracking and process-wide profile aggregation.
//!
//! Every thread keeps a LIFO stack of active scopes plus subsystem/session
//! override stacks (nested overrides restore on pop). On exit a scope
//! attributes its inclusive counter delta to the `(parent_signature,
//! function_signature)` aggregate and folds the delta into its parent's
//! children accumulator, so the parent's eventual exclusive (self) delta
//! excludes nested work.
//!
//! The aggregation map is the only process-wide mutable resource; it is
//! guarded by a plain mutex since every access mutates. Per-thread state is
//! never shared. Scope entry and exit stay synchronous: a bounded number of
//! counter reads plus one short map-lock acquisition.

use std::cell::RefCell;
use std::sync::PoisonError;

use gnomon_core::histogram::Histogram;
use gnomon_core::snapshot::{CounterKind, CounterSnapshot, CounterUnit, DerivedMetric, DerivedMetrics};

use crate::build_mode::{BuildMode, RecordCategory};
use crate::counter::{self, CounterProvider};
use crate::lifecycle::{self, ProcessState};
use crate::record::{keys, Record, SourceLocation};

/// Aggregation key: content equality over the signature strings, since the
/// same signature may be observed through different string handles.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ProfileKey {
    pub(crate) parent: String,
    pub(crate) function: String,
}

/// Process-wide accumulator for one (parent, function) pair.
pub(crate) struct ProfileAggregate {
    subsystem: String,
    request: String,
    location: SourceLocation,
    call_count: u64,
    workload_sum: f64,
    inclusive_total: CounterSnapshot,
    exclusive_self: CounterSnapshot,
    wall_histogram: Histogram,
    cpu_histogram: Histogram,
}

/// One active scope on a thread's stack.
struct Frame {
    signature: String,
    parent_signature: String,
    subsystem: String,
    session: String,
    workload: f64,
    location: SourceLocation,
    pushed_subsystem: bool,
    pushed_session: bool,
    entry_snapshot: CounterSnapshot,
    children_inclusive: CounterSnapshot,
}

struct ThreadState {
    ordinal: u64,
    provider: Box<dyn CounterProvider>,
    frames: Vec<Frame>,
    subsystems: Vec<String>,
    sessions: Vec<String>,
    fault_reported: bool,
    skew_reported: bool,
}

thread_local! {
    static THREAD: RefCell<Option<ThreadState>> = const { RefCell::new(None) };
}

impl ThreadState {
    fn acquire() -> ThreadState {
        lifecycle::install();
        let ordinal = lifecycle::thread_acquired();
        let mut provider = counter::open_provider();
        provider.reset();
        provider.enable();
        ThreadState {
            ordinal,
            provider,
            frames: Vec::new(),
            subsystems: Vec::new(),
            sessions: Vec::new(),
            fault_reported: false,
            skew_reported: false,
        }
    }
}

impl Drop for ThreadState {
    fn drop(&mut self) {
        if !self.frames.is_empty() {
            lifecycle::diagnostic(
                "lifecycle_misuse",
                format!("thread released with {} active scopes", self.frames.len()),
            );
        }
        self.provider.close();
        lifecycle::thread_released();
    }
}

/// Run `f` against this thread's state, acquiring it lazily. Returns `None`
/// only during thread-local teardown.
fn with_thread<R>(f: impl FnOnce(&mut ThreadState) -> R) -> Option<R> {
    THREAD
        .try_with(|cell| {
            let mut slot = cell.borrow_mut();
            let state = slot.get_or_insert_with(ThreadState::acquire);
            f(state)
        })
        .ok()
}

/// Ordinal of the calling thread, if its lifecycle is active and accessible.
pub(crate) fn current_thread_ordinal() -> Option<u64> {
    THREAD
        .try_with(|cell| {
            cell.try_borrow()
                .ok()
                .and_then(|slot| slot.as_ref().map(|thread| thread.ordinal))
        })
        .ok()
        .flatten()
}

/// Signature of the innermost active scope on the calling thread.
pub(crate) fn current_function_signature() -> Option<String> {
    THREAD
        .try_with(|cell| {
            cell.try_borrow().ok().and_then(|slot| {
                slot.as_ref()
                    .and_then(|thread| thread.frames.last().map(|frame| frame.signature.clone()))
            })
        })
        .ok()
        .flatten()
}

/// Release the calling thread's lifecycle, closing its counter provider.
pub(crate) fn release_current_thread() {
    let state = THREAD.try_with(|cell| cell.borrow_mut().take()).ok().flatten();
    // Dropped outside the borrow: release emits diagnostics of its own.
    drop(state);
}

/// Guard for one instrumented function or block.
///
/// Bind it to a local so the scope spans the rest of the block:
///
/// ```ignore
/// fn transform(rows: &[Row]) {
///     let _scope = gnomon::function_scope!("etl", rows.len() as f64);
///     // ...
/// }
/// ```
///
/// Guards release in LIFO order per thread, which local bindings guarantee.
/// Release runs on every exit path, including unwinding.
#[must_use = "binding the scope guard keeps the scope open until end of block"]
pub struct Scope {
    armed: bool,
}

impl Scope {
    /// Enter a function scope. Prefer [`crate::function_scope!`], which
    /// captures the enclosing signature automatically.
    #[track_caller]
    pub fn function(signature: &str) -> Scope {
        Self::enter(signature, None, 0.0, None, SourceLocation::caller())
    }

    /// Enter a function scope with subsystem/workload/session tags.
    #[track_caller]
    pub fn function_with(
        signature: &str,
        subsystem: Option<&str>,
        workload: f64,
        session: Option<&str>,
    ) -> Scope {
        Self::enter(signature, subsystem, workload, session, SourceLocation::caller())
    }

    /// Enter a named block scope inside a function.
    #[track_caller]
    pub fn block(name: &str) -> Scope {
        Self::enter(name, None, 0.0, None, SourceLocation::caller())
    }

    /// Enter a named block scope with subsystem/workload/session tags.
    #[track_caller]
    pub fn block_with(
        name: &str,
        subsystem: Option<&str>,
        workload: f64,
        session: Option<&str>,
    ) -> Scope {
        Self::enter(name, subsystem, workload, session, SourceLocation::caller())
    }

    fn enter(
        signature: &str,
        subsystem: Option<&str>,
        workload: f64,
        session: Option<&str>,
        location: SourceLocation,
    ) -> Scope {
        if !BuildMode::enabled() {
            return Scope { armed: false };
        }

        let mut fault_note: Option<String> = None;
        let entered = with_thread(|thread| {
            let entry_snapshot = thread.provider.snapshot();
            if let Some(fault) = thread.provider.take_fault() {
                if !thread.fault_reported {
                    thread.fault_reported = true;
                    fault_note = Some(fault.to_string());
                }
            }

            let parent_signature = thread
                .frames
                .last()
                .map(|frame| frame.signature.clone())
                .unwrap_or_default();

            let pushed_subsystem = subsystem.is_some();
            if let Some(subsystem) = subsystem {
                thread.subsystems.push(subsystem.to_owned());
            }
            let pushed_session = session.is_some();
            if let Some(session) = session {
                thread.sessions.push(session.to_owned());
            }

            thread.frames.push(Frame {
                signature: signature.to_owned(),
                parent_signature,
                subsystem: thread.subsystems.last().cloned().unwrap_or_default(),
                session: thread.sessions.last().cloned().unwrap_or_default(),
                workload,
                location,
                pushed_subsystem,
                pushed_session,
                entry_snapshot,
                children_inclusive: CounterSnapshot::zeroed(),
            });
        });

        if let Some(message) = fault_note {
            lifecycle::diagnostic("counter_unavailable", message);
        }
        Scope {
            armed: entered.is_some(),
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut misuse = false;
        let mut fault_note: Option<String> = None;
        let mut skew_note: Option<String> = None;

        with_thread(|thread| {
            let exit_snapshot = thread.provider.snapshot();
            if let Some(fault) = thread.provider.take_fault() {
                if !thread.fault_reported {
                    thread.fault_reported = true;
                    fault_note = Some(fault.to_string());
                }
            }

            let Some(frame) = thread.frames.pop() else {
                misuse = true;
                return;
            };

            let inclusive = exit_snapshot.delta_since(&frame.entry_snapshot);
            if !inclusive.skewed.is_empty() && !thread.skew_reported {
                thread.skew_reported = true;
                let kinds: Vec<&str> = inclusive.skewed.iter().map(CounterKind::name).collect();
                skew_note = Some(kinds.join(","));
            }

            // Exclusive (self) delta: inclusive minus what nested scopes
            // already claimed. A child with an unavailable field poisons the
            // parent's exclusive field too.
            let exclusive = inclusive.snapshot.delta_since(&frame.children_inclusive);

            if let Some(parent) = thread.frames.last_mut() {
                parent.children_inclusive.accumulate(&inclusive.snapshot);
            }
            if frame.pushed_subsystem {
                thread.subsystems.pop();
            }
            if frame.pushed_session {
                thread.sessions.pop();
            }

            update_aggregate(&frame, &inclusive.snapshot, &exclusive.snapshot);
        });

        if misuse {
            lifecycle::diagnostic(
                "lifecycle_misuse",
                String::from("scope exit without a matching entry"),
            );
        }
        if let Some(message) = fault_note {
            lifecycle::diagnostic("counter_unavailable", message);
        }
        if let Some(kinds) = skew_note {
            lifecycle::diagnostic(
                "snapshot_skew",
                format!("counter deltas went backwards for: {kinds}"),
            );
        }
    }
}

fn update_aggregate(frame: &Frame, inclusive: &CounterSnapshot, exclusive: &CounterSnapshot) {
    let state = lifecycle::process();
    let mut aggregates = state
        .aggregates
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    let key = ProfileKey {
        parent: frame.parent_signature.clone(),
        function: frame.signature.clone(),
    };
    let aggregate = aggregates.entry(key).or_insert_with(|| ProfileAggregate {
        subsystem: frame.subsystem.clone(),
        request: frame.session.clone(),
        location: frame.location,
        call_count: 0,
        workload_sum: 0.0,
        inclusive_total: CounterSnapshot::zeroed(),
        exclusive_self: CounterSnapshot::zeroed(),
        wall_histogram: Histogram::new(),
        cpu_histogram: Histogram::new(),
    });

    aggregate.call_count += 1;
    aggregate.workload_sum += frame.workload;
    aggregate.inclusive_total.accumulate(inclusive);
    aggregate.exclusive_self.accumulate(exclusive);
    if let Some(wall_ns) = inclusive.get(CounterKind::WallDuration) {
        aggregate.wall_histogram.add(wall_ns);
    }
    if let Some(cpu_ns) = inclusive.get(CounterKind::CpuClock) {
        aggregate.cpu_histogram.add(cpu_ns);
    }
}

/// Drain the aggregation map and emit one record per entry, in descending
/// order of inclusive wall time.
pub(crate) fn emit_aggregates(state: &ProcessState) {
    let mut entries: Vec<(ProfileKey, ProfileAggregate)> = state
        .aggregates
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain()
        .collect();
    if !BuildMode::CURRENT.emits(RecordCategory::Profile) {
        return;
    }

    entries.sort_by(|a, b| {
        let a_wall = a.1.inclusive_total.value(CounterKind::WallDuration);
        let b_wall = b.1.inclusive_total.value(CounterKind::WallDuration);
        b_wall.cmp(&a_wall)
    });

    for (key, mut aggregate) in entries {
        let mut record = state.base_record(RecordCategory::Profile);
        record.set(keys::EVENT, "profile");
        if !aggregate.subsystem.is_empty() {
            record.set(keys::SUBSYSTEM, aggregate.subsystem.as_str());
        }
        if !aggregate.request.is_empty() {
            record.set(keys::REQUEST, aggregate.request.as_str());
        }
        record.merge(aggregate.location.to_record());
        record.set(keys::FUNCTION, key.function.as_str());
        record.set(keys::PARENT_FUNCTION, key.parent.as_str());
        record.set("prof.calls", aggregate.call_count);
        record.set("prof.workload", aggregate.workload_sum);

        let mut missing: Vec<String> = Vec::new();
        append_counters(&mut record, &aggregate.inclusive_total, "total", &mut missing);
        append_counters(&mut record, &aggregate.exclusive_self, "self", &mut missing);

        let inclusive_metrics = DerivedMetrics::from_snapshot(&aggregate.inclusive_total);
        let exclusive_metrics = DerivedMetrics::from_snapshot(&aggregate.exclusive_self);
        for metric in DerivedMetric::ALL {
            record.set(
                format!("prof.{}.total", metric.name()),
                inclusive_metrics.get(metric),
            );
            record.set(
                format!("prof.{}.self", metric.name()),
                exclusive_metrics.get(metric),
            );
        }

        record.set("prof.sw.duration.stats", aggregate.wall_histogram.statistics());
        record.set("prof.sw.cpu_clock.stats", aggregate.cpu_histogram.statistics());
        if !missing.is_empty() {
            record.set("prof.counters_unavailable", missing.join(","));
        }

        state.pipeline.submit(record);
    }
}

fn append_counters(
    record: &mut Record,
    snapshot: &CounterSnapshot,
    side: &str,
    missing: &mut Vec<String>,
) {
    for kind in CounterKind::ALL {
        let key = format!("prof.{}.{side}", kind.name());
        match snapshot.get(kind) {
            Some(value) => match kind.unit() {
                // Clock counters emit as real seconds, event counts as ints.
                CounterUnit::Nanoseconds => record.set(key, value as f64 / 1e9),
                _ => record.set(key, value),
            },
            None => {
                match kind.unit() {
                    CounterUnit::Nanoseconds => record.set(key, 0.0f64),
                    _ => record.set(key, 0i64),
                }
                missing.push(format!("{}.{side}", kind.name()));
            }
        }
    }
}
