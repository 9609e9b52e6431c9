//! Process and thread lifecycles.
//!
//! The process lifecycle is a singleton created on the first instrumentation
//! call (or an explicit [`install`]): it owns the sink pipeline, the profile
//! aggregation map, and process identity. Releasing it — [`shutdown`] or
//! dropping a [`LifecycleGuard`] — emits the final aggregates and drains the
//! pipeline. The host must release before process teardown; nothing else
//! guarantees that sink files are complete.
//!
//! Thread lifecycles are acquired lazily on each thread's first
//! instrumentation call (see [`crate::scope`]): the thread gets a counter
//! provider and a 1-based ordinal, and the active-thread count tracks it
//! until release. Worker threads release automatically at thread exit;
//! `shutdown` releases the calling thread itself, so a host that joins its
//! workers first observes a zero active count.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Instant;

use chrono::Local;

use crate::build_mode::{BuildMode, RecordCategory};
use crate::path;
use crate::record::{keys, Record, RecordValue};
use crate::scope::{self, ProfileAggregate, ProfileKey};
use crate::sink::{JsonSink, RecordFilter, Sink, SinkPipeline, TableSink};

pub(crate) struct ProcessState {
    pub(crate) process_name: String,
    pub(crate) process_id: u32,
    pub(crate) started: Instant,
    pub(crate) pipeline: SinkPipeline,
    pub(crate) aggregates: Mutex<HashMap<ProfileKey, ProfileAggregate>>,
    client: Mutex<Option<String>>,
    threads_created: AtomicU64,
    threads_active: AtomicU64,
    shut_down: AtomicBool,
}

static PROCESS: OnceLock<ProcessState> = OnceLock::new();

pub(crate) fn process() -> &'static ProcessState {
    PROCESS.get_or_init(|| ProcessState {
        process_name: path::program_name(),
        process_id: std::process::id(),
        started: Instant::now(),
        pipeline: SinkPipeline::new(),
        aggregates: Mutex::new(HashMap::new()),
        client: Mutex::new(None),
        threads_created: AtomicU64::new(0),
        threads_active: AtomicU64::new(0),
        shut_down: AtomicBool::new(false),
    })
}

impl ProcessState {
    /// Record pre-populated with the standard identity keys.
    pub(crate) fn base_record(&self, category: RecordCategory) -> Record {
        let mut record = Record::with_capacity(8);
        record.set(keys::PROCESS_NAME, self.process_name.as_str());
        record.set(keys::PROCESS_ID, self.process_id);
        if let Some(ordinal) = scope::current_thread_ordinal() {
            record.set(keys::THREAD_ID, ordinal);
        }
        record.set(keys::TIMESTAMP, RecordValue::Timestamp(Local::now()));
        record.set(keys::BUILD_MODE, BuildMode::CURRENT.name());
        record.set(keys::CATEGORY, category.name());
        let client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = client.as_deref() {
            record.set(keys::CLIENT, client);
        }
        record
    }
}

/// Initialize the process lifecycle. Idempotent; every instrumentation point
/// also does this lazily, so calling it is only needed to front-load setup.
pub fn install() {
    if !BuildMode::enabled() {
        return;
    }
    let _ = process();
}

/// Tag subsequent records with a client identity.
pub fn set_client(client: &str) {
    if !BuildMode::enabled() {
        return;
    }
    let state = process();
    *state.client.lock().unwrap_or_else(PoisonError::into_inner) = Some(client.to_owned());
}

/// Register a custom sink with an optional record filter.
///
/// # Errors
///
/// Returns an error when the sink worker cannot be spawned.
pub fn add_sink(sink: Box<dyn Sink>, filter: Option<RecordFilter>) -> io::Result<()> {
    if !BuildMode::enabled() {
        return Ok(());
    }
    process().pipeline.add_sink(sink, filter)
}

/// Register a newline-delimited JSON sink at a path spec
/// (`<temp>`, `<home>`, `<current>`, `<cout>`, `<clog>`, `<cerr>`).
///
/// # Errors
///
/// Returns an error when the destination cannot be created.
pub fn add_json_sink(path_spec: &str) -> io::Result<()> {
    if !BuildMode::enabled() {
        return Ok(());
    }
    add_sink(Box::new(JsonSink::create(path_spec)?), None)
}

/// Register a delimited-text sink with a fixed column projection.
///
/// # Errors
///
/// Returns an error when the destination cannot be created.
pub fn add_table_sink(
    fields: Vec<String>,
    path_spec: &str,
    separator: &str,
    quote: &str,
) -> io::Result<()> {
    if !BuildMode::enabled() {
        return Ok(());
    }
    add_sink(
        Box::new(TableSink::create(fields, path_spec, separator, quote)?),
        None,
    )
}

/// Submit a record, honoring the build mode's category emission policy.
pub(crate) fn submit(category: RecordCategory, record: Record) {
    if !BuildMode::CURRENT.emits(category) {
        return;
    }
    process().pipeline.submit(record);
}

/// Library diagnostic (counter faults, lifecycle misuse, snapshot skew).
pub(crate) fn diagnostic(subcategory: &str, message: String) {
    let state = process();
    let mut record = state.base_record(RecordCategory::Message);
    record.set(keys::SUBCATEGORY, subcategory);
    record.set(keys::MESSAGE, message);
    submit(RecordCategory::Message, record);
}

/// Acquire the thread lifecycle; returns the thread's 1-based ordinal.
pub(crate) fn thread_acquired() -> u64 {
    let state = process();
    state.threads_active.fetch_add(1, Ordering::SeqCst);
    state.threads_created.fetch_add(1, Ordering::SeqCst) + 1
}

pub(crate) fn thread_released() {
    if let Some(state) = PROCESS.get() {
        state.threads_active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Block until every record submitted so far has been written by the sinks.
pub fn flush() {
    if !BuildMode::enabled() {
        return;
    }
    if let Some(state) = PROCESS.get() {
        state.pipeline.drain();
    }
}

/// Release the process lifecycle: emit final aggregates, then drain and join
/// the sink pipeline. Idempotent; returns only after the last write.
///
/// The calling thread's own lifecycle is released first. Hosts are expected
/// to have joined their instrumented threads already; if not, a
/// `lifecycle_misuse` record is emitted and emission proceeds best effort.
pub fn shutdown() {
    if !BuildMode::enabled() {
        return;
    }
    let Some(state) = PROCESS.get() else {
        return;
    };
    if state.shut_down.swap(true, Ordering::SeqCst) {
        return;
    }

    scope::release_current_thread();
    let active = state.threads_active.load(Ordering::SeqCst);
    if active != 0 {
        diagnostic(
            "lifecycle_misuse",
            format!("shutdown with {active} instrumented threads still active"),
        );
    }

    let mut summary = state.base_record(RecordCategory::Message);
    summary.set(keys::SUBCATEGORY, "process");
    summary.set(keys::EVENT, "shutdown");
    summary.set("duration_secs", state.started.elapsed().as_secs_f64());
    summary.set("threads", state.threads_created.load(Ordering::SeqCst));
    submit(RecordCategory::Message, summary);

    scope::emit_aggregates(state);
    state.pipeline.shutdown();
}

/// Scoped process acquisition: [`install`]s on creation, [`shutdown`]s on
/// drop, so final aggregates are emitted on every exit path of `main`.
pub struct LifecycleGuard {
    _private: (),
}

impl LifecycleGuard {
    pub fn new() -> Self {
        install();
        LifecycleGuard { _private: () }
    }
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        shutdown();
    }
}
