//! Design-by-contract checks that report through the record pipeline.
//!
//! Five check kinds: [`argument`] (precondition on inputs), [`expect`]
//! (precondition on collaborator state), [`confirm`] (assertion mid-body),
//! [`Invariant`] (checked on scope entry and exit), [`Ensure`] (checked on
//! exit only). A violation emits a contract record and then propagates as a
//! panic carrying a [`ContractViolation`] payload, recoverable with
//! `catch_unwind` and a downcast.
//!
//! Two cases do not propagate: production builds record the violation and
//! continue, and a guard whose predicate fails while the thread is already
//! unwinding records and swallows it — raising there would turn one failure
//! into an abort.

use std::fmt;
use std::panic;

use crate::build_mode::{BuildMode, RecordCategory};
use crate::lifecycle;
use crate::record::{keys, SourceLocation};
use crate::scope;

/// The five check kinds, named in the `subcategory` record key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContractKind {
    Argument,
    Expect,
    Confirm,
    Invariant,
    Ensure,
}

impl ContractKind {
    pub const fn name(self) -> &'static str {
        match self {
            ContractKind::Argument => "argument",
            ContractKind::Expect => "expect",
            ContractKind::Confirm => "confirm",
            ContractKind::Invariant => "invariant",
            ContractKind::Ensure => "ensure",
        }
    }
}

/// Panic payload raised for a failed contract check.
#[derive(Clone, Debug)]
pub struct ContractViolation {
    pub kind: ContractKind,
    pub message: String,
    pub location: SourceLocation,
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

impl std::error::Error for ContractViolation {}

/// Precondition on the function's own arguments.
#[track_caller]
pub fn argument(condition: bool) {
    if BuildMode::enabled() && !condition {
        violate(ContractKind::Argument, "invalid argument", SourceLocation::caller(), false);
    }
}

/// Precondition on the state of collaborating objects.
#[track_caller]
pub fn expect(condition: bool) {
    if BuildMode::enabled() && !condition {
        violate(ContractKind::Expect, "expect condition failed", SourceLocation::caller(), false);
    }
}

/// Assertion mid-body.
#[track_caller]
pub fn confirm(condition: bool) {
    if BuildMode::enabled() && !condition {
        violate(ContractKind::Confirm, "assertion failed", SourceLocation::caller(), false);
    }
}

fn violate(kind: ContractKind, message: &str, location: SourceLocation, releasing: bool) {
    let state = lifecycle::process();
    let mut record = state.base_record(RecordCategory::Contract);
    record.set(keys::SUBCATEGORY, kind.name());
    record.set(keys::MESSAGE, message);
    record.merge(location.to_record());
    if let Some(function) = scope::current_function_signature() {
        record.set(keys::FUNCTION, function);
    }
    lifecycle::submit(RecordCategory::Contract, record);

    if !BuildMode::CURRENT.contracts_propagate() {
        return;
    }
    if releasing && std::thread::panicking() {
        // Already unwinding: a second panic would abort. Recorded above.
        return;
    }
    panic::panic_any(ContractViolation {
        kind,
        message: message.to_owned(),
        location,
    });
}

/// Scoped invariant: the predicate must hold on construction and again when
/// the guard drops.
///
/// ```ignore
/// let _inv = gnomon::Invariant::new(|| queue.is_sorted());
/// ```
pub struct Invariant<F: Fn() -> bool> {
    predicate: F,
    location: SourceLocation,
    armed: bool,
}

impl<F: Fn() -> bool> Invariant<F> {
    #[track_caller]
    pub fn new(predicate: F) -> Self {
        let location = SourceLocation::caller();
        let armed = BuildMode::enabled();
        if armed && !predicate() {
            violate(ContractKind::Invariant, "invariant failed on entry", location, false);
        }
        Self {
            predicate,
            location,
            armed,
        }
    }
}

impl<F: Fn() -> bool> Drop for Invariant<F> {
    fn drop(&mut self) {
        if self.armed && !(self.predicate)() {
            violate(
                ContractKind::Invariant,
                "invariant failed on exit",
                self.location,
                true,
            );
        }
    }
}

/// Scoped postcondition: the predicate is evaluated only when the guard
/// drops.
pub struct Ensure<F: Fn() -> bool> {
    predicate: F,
    location: SourceLocation,
    armed: bool,
}

impl<F: Fn() -> bool> Ensure<F> {
    #[track_caller]
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            location: SourceLocation::caller(),
            armed: BuildMode::enabled(),
        }
    }
}

impl<F: Fn() -> bool> Drop for Ensure<F> {
    fn drop(&mut self) {
        if self.armed && !(self.predicate)() {
            violate(
                ContractKind::Ensure,
                "ensure condition failed on exit",
                self.location,
                true,
            );
        }
    }
}
