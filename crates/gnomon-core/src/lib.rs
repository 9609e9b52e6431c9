//! Core measurement types for the gnomon instrumentation engine.
//!
//! This crate holds the pure, platform-independent half of gnomon: counter
//! kinds, snapshot arithmetic with multiplexing-aware availability tracking,
//! derived hardware metrics, and a bounded-memory histogram with robust
//! quantile statistics. It is `no_std` + alloc capable so the same algorithms
//! can be reused from constrained environments; float math goes through
//! `libm` wrappers in [`math`].
//!
//! The platform integration (Linux perf_event, scope tracking, record sinks)
//! lives in the main `gnomon` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod histogram;
pub mod math;
pub mod snapshot;

pub use histogram::{Histogram, MAX_BUCKETS};
pub use snapshot::{
    CounterCategory, CounterKind, CounterSnapshot, CounterUnit, DerivedMetric, DerivedMetrics,
    HardwareGroup, SkewSet, SnapshotDelta, TimingPair,
};
