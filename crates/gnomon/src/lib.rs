//! In-process instrumentation for native programs.
//!
//! Annotate functions and blocks; gnomon records wall time and Linux
//! hardware/software performance counters per thread, aggregates per-function
//! statistics with parent-call context, enforces design-by-contract
//! assertions, and streams structured records to pluggable asynchronous
//! sinks.
//!
//! ```ignore
//! fn main() {
//!     let _lifecycle = gnomon::LifecycleGuard::new();
//!     gnomon::add_json_sink("<temp>").unwrap();
//!
//!     transform();
//! } // final aggregates emitted and sinks drained here
//!
//! fn transform() {
//!     let _scope = gnomon::function_scope!("etl", 1.0);
//!     gnomon::argument(true);
//!     // ...
//! }
//! ```
//!
//! # Build modes
//!
//! A single compile-time switch (cargo features `mode-development`,
//! `mode-test`, `mode-profile`, `mode-qa`, `mode-production`; none = off)
//! selects whether instrumentation is elided entirely or active. Modes vary
//! only in which record categories are emitted and whether contract
//! violations propagate; see [`BuildMode`].
//!
//! # Degradation
//!
//! Instrumentation never propagates errors into the host application.
//! Kernel counters that cannot be opened or read degrade to
//! unavailable-flagged fields; wall-clock timing keeps working everywhere.
//! Only contract violations in non-production modes propagate, as panics
//! carrying a [`ContractViolation`].

pub mod build_mode;
pub mod contract;
pub mod counter;
pub mod event;
pub mod lifecycle;
mod macros;
pub mod path;
pub mod record;
pub mod scope;
pub mod sink;

pub use build_mode::{BuildMode, RecordCategory};
pub use contract::{argument, confirm, expect, ContractKind, ContractViolation, Ensure, Invariant};
pub use event::message;
pub use lifecycle::{
    add_json_sink, add_sink, add_table_sink, flush, install, set_client, shutdown, LifecycleGuard,
};
pub use record::{format_timestamp, Record, RecordValue, SourceLocation, Timestamp};
pub use scope::Scope;
pub use sink::{JsonSink, RecordFilter, Sink, SinkPipeline, TableSink};

pub use gnomon_core::histogram::Histogram;
pub use gnomon_core::snapshot::{
    CounterKind, CounterSnapshot, DerivedMetric, DerivedMetrics, HardwareGroup,
};
