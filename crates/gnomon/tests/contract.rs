//! Contract checks: violation records, propagation, swallow-during-unwind.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock};

use gnomon::record::keys;
use gnomon::{ContractKind, ContractViolation, Record, Sink};

#[derive(Clone)]
struct CaptureSink(Arc<Mutex<Vec<Record>>>);

impl Sink for CaptureSink {
    fn write(&mut self, record: &Record) -> bool {
        self.0.lock().unwrap().push(record.clone());
        true
    }
}

/// One shared capture sink for the whole test binary; tests tell their
/// records apart by subcategory.
fn captured() -> &'static Arc<Mutex<Vec<Record>>> {
    static CAPTURED: OnceLock<Arc<Mutex<Vec<Record>>>> = OnceLock::new();
    CAPTURED.get_or_init(|| {
        let records = Arc::new(Mutex::new(Vec::new()));
        gnomon::install();
        gnomon::add_sink(Box::new(CaptureSink(Arc::clone(&records))), None).unwrap();
        records
    })
}

fn contract_records(subcategory: &str) -> Vec<Record> {
    gnomon::flush();
    captured()
        .lock()
        .unwrap()
        .iter()
        .filter(|record| {
            record.get(keys::CATEGORY).and_then(|v| v.as_str()) == Some("contract")
                && record.get(keys::SUBCATEGORY).and_then(|v| v.as_str()) == Some(subcategory)
        })
        .cloned()
        .collect()
}

#[test]
fn expect_violation_emits_record_then_propagates() {
    let result = panic::catch_unwind(|| gnomon::expect(false));
    let payload = result.unwrap_err();
    let violation = payload
        .downcast::<ContractViolation>()
        .expect("payload must be a ContractViolation");
    assert_eq!(violation.kind, ContractKind::Expect);
    assert_eq!(violation.location.file, file!());
    assert!(violation.location.line > 0);

    let records = contract_records("expect");
    assert_eq!(records.len(), 1, "{records:?}");
    let record = &records[0];
    assert_eq!(
        record.get(keys::MESSAGE).and_then(|v| v.as_str()),
        Some("expect condition failed")
    );
    assert_eq!(
        record.get(keys::FILE).and_then(|v| v.as_str()),
        Some(file!())
    );
    assert!(record.get(keys::LINE).and_then(|v| v.as_int()).unwrap() > 0);
}

#[test]
fn argument_violation_carries_its_kind() {
    let result = panic::catch_unwind(|| gnomon::argument(false));
    let violation = result.unwrap_err().downcast::<ContractViolation>().unwrap();
    assert_eq!(violation.kind, ContractKind::Argument);
    assert_eq!(contract_records("argument").len(), 1);
}

#[test]
fn passing_checks_are_silent() {
    gnomon::argument(true);
    gnomon::expect(true);
    gnomon::confirm(true);
    let _invariant = gnomon::Invariant::new(|| true);
    let _ensure = gnomon::Ensure::new(|| true);
    drop(_ensure);
    drop(_invariant);
    assert!(contract_records("confirm").is_empty());
}

#[test]
fn invariant_checks_on_entry() {
    let result = panic::catch_unwind(|| {
        let _invariant = gnomon::Invariant::new(|| false);
    });
    let violation = result.unwrap_err().downcast::<ContractViolation>().unwrap();
    assert_eq!(violation.kind, ContractKind::Invariant);
    assert!(violation.message.contains("entry"), "{}", violation.message);
}

#[test]
fn ensure_checks_on_release() {
    let balance = std::cell::Cell::new(10i64);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ensure = gnomon::Ensure::new(|| balance.get() >= 0);
        balance.set(balance.get() - 100);
    }));
    let violation = result.unwrap_err().downcast::<ContractViolation>().unwrap();
    assert_eq!(violation.kind, ContractKind::Ensure);
}

#[test]
fn release_failures_during_unwind_are_recorded_and_swallowed() {
    let result = panic::catch_unwind(|| {
        let _ensure = gnomon::Ensure::new(|| false);
        panic!("primary failure");
    });
    // The primary panic survives; the guard's violation must not replace it
    // (a second panic during unwind would abort the process).
    let payload = result.unwrap_err();
    let message = payload.downcast_ref::<&str>().copied();
    assert_eq!(message, Some("primary failure"));

    let records = contract_records("ensure");
    assert!(
        records.iter().any(|record| {
            record
                .get(keys::MESSAGE)
                .and_then(|v| v.as_str())
                .is_some_and(|m| m.contains("exit"))
        }),
        "swallowed violation must still be recorded: {records:?}"
    );
}
