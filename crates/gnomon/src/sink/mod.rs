//! Record sinks and the asynchronous fan-out pipeline.
//!
//! A [`SinkPipeline`] owns zero or more [`Sink`]s, each serviced by its own
//! worker thread fed through a channel. `submit` enqueues a shared record to
//! every worker and returns; the workers never call back into
//! instrumentation. Shutdown drops the senders, lets every queue drain, and
//! joins the workers, so no record handed to the pipeline is ever lost.
//!
//! If no sink has been registered by the time of the first submission, a
//! default newline-delimited JSON sink writing under the temp directory is
//! installed exactly once.

use std::io;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};
use serde::{Deserialize, Serialize};

use crate::record::{keys, Record, RecordValue};

mod json;
mod stream;
mod table;

pub use json::JsonSink;
pub use stream::SyncStream;
pub use table::TableSink;

/// Destination for records.
///
/// `write` runs on the sink's own worker thread and never shares state with
/// other sinks; a sink holding mutable state (a file handle, say) is
/// responsible for its own synchronization only if it shares that state
/// elsewhere.
pub trait Sink: Send + 'static {
    /// Write one record. Returns false on failure; the pipeline counts
    /// failures and never propagates them into the instrumentation path.
    fn write(&mut self, record: &Record) -> bool;

    /// Flush buffered output. Called once as the worker shuts down.
    fn flush(&mut self) {}
}

/// Pure predicate over records, applied before a record reaches a sink.
///
/// Empty criteria match everything. Hosts typically build this from their
/// environment or configuration layer and attach it when registering a sink.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub subsystems: Option<Vec<String>>,
    #[serde(default)]
    pub clients: Option<Vec<String>>,
    #[serde(default)]
    pub requests: Option<Vec<String>>,
}

impl RecordFilter {
    pub fn allows(&self, record: &Record) -> bool {
        Self::matches(&self.categories, record, keys::CATEGORY)
            && Self::matches(&self.subsystems, record, keys::SUBSYSTEM)
            && Self::matches(&self.clients, record, keys::CLIENT)
            && Self::matches(&self.requests, record, keys::REQUEST)
    }

    fn matches(criteria: &Option<Vec<String>>, record: &Record, key: &str) -> bool {
        match criteria {
            None => true,
            Some(values) => record
                .get(key)
                .and_then(RecordValue::as_str)
                .map(|value| values.iter().any(|candidate| candidate == value))
                .unwrap_or(false),
        }
    }
}

struct SinkWorker {
    sender: Sender<Arc<Record>>,
    handle: JoinHandle<()>,
    submitted: u64,
    processed: Arc<AtomicU64>,
}

/// Fan-out of records to asynchronous sink workers.
pub struct SinkPipeline {
    workers: Mutex<Vec<SinkWorker>>,
    write_failures: Arc<AtomicU64>,
    default_attempted: AtomicBool,
    shut_down: AtomicBool,
}

impl SinkPipeline {
    pub fn new() -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
            write_failures: Arc::new(AtomicU64::new(0)),
            default_attempted: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Register a sink with an optional filter, spawning its worker.
    ///
    /// # Errors
    ///
    /// Returns an error only when the worker thread cannot be spawned.
    pub fn add_sink(
        &self,
        sink: Box<dyn Sink>,
        filter: Option<RecordFilter>,
    ) -> io::Result<()> {
        let worker = self.spawn_worker(sink, filter)?;
        self.lock_workers().push(worker);
        Ok(())
    }

    fn spawn_worker(
        &self,
        sink: Box<dyn Sink>,
        filter: Option<RecordFilter>,
    ) -> io::Result<SinkWorker> {
        let (sender, receiver) = unbounded::<Arc<Record>>();
        let processed = Arc::new(AtomicU64::new(0));
        let worker_processed = Arc::clone(&processed);
        let failures = Arc::clone(&self.write_failures);

        let handle = thread::Builder::new()
            .name(String::from("gnomon-sink"))
            .spawn(move || {
                let mut sink = sink;
                for record in receiver {
                    let allowed = filter.as_ref().map_or(true, |f| f.allows(&record));
                    if allowed && !sink.write(&record) {
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                    worker_processed.fetch_add(1, Ordering::Release);
                }
                sink.flush();
            })?;

        Ok(SinkWorker {
            sender,
            handle,
            submitted: 0,
            processed,
        })
    }

    pub fn sink_count(&self) -> usize {
        self.lock_workers().len()
    }

    /// Dispatch a record to every sink. Non-blocking apart from the pipeline
    /// mutex, held for O(sinks).
    pub fn submit(&self, record: Record) {
        if self.shut_down.load(Ordering::Acquire) {
            tracing::warn!("record submitted after sink pipeline shutdown, dropping");
            return;
        }

        let mut workers = self.lock_workers();
        if workers.is_empty() {
            self.install_default_sink(&mut workers);
        }

        let record = Arc::new(record);
        for worker in workers.iter_mut() {
            if worker.sender.send(Arc::clone(&record)).is_ok() {
                worker.submitted += 1;
            }
        }
    }

    /// Block until every record submitted so far has been written.
    pub fn drain(&self) {
        let pending: Vec<(Arc<AtomicU64>, u64)> = self
            .lock_workers()
            .iter()
            .map(|worker| (Arc::clone(&worker.processed), worker.submitted))
            .collect();
        for (processed, submitted) in pending {
            while processed.load(Ordering::Acquire) < submitted {
                thread::sleep(Duration::from_micros(50));
            }
        }
    }

    /// Stop accepting records, wait for all outstanding writes, and join the
    /// workers. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let workers = mem::take(&mut *self.lock_workers());
        for worker in workers {
            let SinkWorker { sender, handle, .. } = worker;
            drop(sender);
            if handle.join().is_err() {
                tracing::warn!("sink worker panicked during shutdown");
            }
        }
    }

    /// Total failed writes across all sinks.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    fn install_default_sink(&self, workers: &mut Vec<SinkWorker>) {
        if self.default_attempted.swap(true, Ordering::SeqCst) {
            return;
        }
        // Workers is already locked by the caller; add_sink would deadlock.
        match JsonSink::create("<temp>").and_then(|sink| self.spawn_worker(Box::new(sink), None)) {
            Ok(worker) => workers.push(worker),
            Err(err) => tracing::warn!(%err, "failed to install default JSON sink"),
        }
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<SinkWorker>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SinkPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SinkPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
