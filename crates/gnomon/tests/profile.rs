//! End-to-end scope profiling: leaf attribution, parent/child split,
//! multi-thread aggregation, final emission through the sink pipeline.
//!
//! Everything runs in a single test because it exercises the process-wide
//! lifecycle, which can be shut down only once per process.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use gnomon::record::keys;
use gnomon::{Record, RecordValue, Sink};

#[derive(Clone)]
struct CaptureSink(Arc<Mutex<Vec<Record>>>);

impl Sink for CaptureSink {
    fn write(&mut self, record: &Record) -> bool {
        self.0.lock().unwrap().push(record.clone());
        true
    }
}

fn leaf() {
    let _scope = gnomon::function_scope!("storage", 2.0);
    std::hint::black_box(17u64);
}

fn inner() {
    let _scope = gnomon::function_scope!();
    thread::sleep(Duration::from_millis(40));
}

fn outer() {
    let _scope = gnomon::function_scope!();
    thread::sleep(Duration::from_millis(30));
    inner();
    thread::sleep(Duration::from_millis(30));
}

fn work() {
    let _scope = gnomon::function_scope!();
    std::hint::black_box(1u64);
}

fn real(record: &Record, key: &str) -> f64 {
    record
        .get(key)
        .and_then(RecordValue::as_real)
        .unwrap_or_else(|| panic!("missing real key {key} in {record:?}"))
}

fn int(record: &Record, key: &str) -> i64 {
    record
        .get(key)
        .and_then(RecordValue::as_int)
        .unwrap_or_else(|| panic!("missing int key {key} in {record:?}"))
}

fn find<'a>(records: &'a [Record], function_suffix: &str) -> &'a Record {
    records
        .iter()
        .find(|record| {
            record.get(keys::CATEGORY).and_then(|v| v.as_str()) == Some("profile")
                && record
                    .get(keys::FUNCTION)
                    .and_then(|v| v.as_str())
                    .is_some_and(|f| f.ends_with(function_suffix))
        })
        .unwrap_or_else(|| panic!("no profile record for {function_suffix}"))
}

#[test]
fn scope_profiling_end_to_end() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    gnomon::install();
    gnomon::add_sink(Box::new(CaptureSink(Arc::clone(&captured))), None).unwrap();

    // Single leaf scope with subsystem and workload.
    leaf();

    // Parent/child wall-time attribution.
    outer();

    // Multi-thread aggregation: 4 threads, 1000 calls each.
    let workers: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(|| {
                for _ in 0..1_000 {
                    work();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    gnomon::shutdown();
    let records = captured.lock().unwrap();

    // No misuse: scopes balanced, workers joined before shutdown.
    assert!(
        !records.iter().any(|record| {
            record.get(keys::SUBCATEGORY).and_then(|v| v.as_str()) == Some("lifecycle_misuse")
        }),
        "unexpected lifecycle_misuse record"
    );

    // Leaf: one call, workload 2.0, exclusive == inclusive, empty parent.
    let leaf_record = find(&records, "::leaf");
    assert_eq!(int(leaf_record, "prof.calls"), 1);
    assert_eq!(real(leaf_record, "prof.workload"), 2.0);
    assert_eq!(
        leaf_record.get(keys::PARENT_FUNCTION).and_then(|v| v.as_str()),
        Some("")
    );
    assert_eq!(
        leaf_record.get(keys::SUBSYSTEM).and_then(|v| v.as_str()),
        Some("storage")
    );
    assert_eq!(
        real(leaf_record, "prof.sw.duration.total"),
        real(leaf_record, "prof.sw.duration.self"),
        "leaf scope must have exclusive == inclusive"
    );

    // Parent/child: outer's inclusive covers both sleeps plus inner's;
    // outer's exclusive excludes inner's inclusive share.
    let outer_record = find(&records, "::outer");
    let inner_record = find(&records, "::inner");
    let outer_total = real(outer_record, "prof.sw.duration.total");
    let outer_self = real(outer_record, "prof.sw.duration.self");
    let inner_total = real(inner_record, "prof.sw.duration.total");
    let inner_self = real(inner_record, "prof.sw.duration.self");

    assert_eq!(int(outer_record, "prof.calls"), 1);
    assert_eq!(int(inner_record, "prof.calls"), 1);
    assert!(
        inner_record
            .get(keys::PARENT_FUNCTION)
            .and_then(|v| v.as_str())
            .is_some_and(|parent| parent.ends_with("::outer")),
        "{inner_record:?}"
    );
    assert!(outer_total >= 0.095, "outer total {outer_total}");
    assert!(inner_total >= 0.038, "inner total {inner_total}");
    assert!(inner_self == inner_total, "inner is a leaf");
    assert!(outer_self >= 0.055, "outer self {outer_self}");
    assert!(
        outer_self <= outer_total - inner_total + 0.001,
        "outer self {outer_self} must exclude inner {inner_total}"
    );

    // Multi-thread: one aggregate across all four threads.
    let work_record = find(&records, "::work");
    assert_eq!(int(work_record, "prof.calls"), 4_000);

    // Final ordering: profile records descend by inclusive wall time.
    let profile_totals: Vec<f64> = records
        .iter()
        .filter(|record| record.get(keys::CATEGORY).and_then(|v| v.as_str()) == Some("profile"))
        .map(|record| real(record, "prof.sw.duration.total"))
        .collect();
    assert!(
        profile_totals.windows(2).all(|pair| pair[0] >= pair[1]),
        "{profile_totals:?}"
    );

    // The process summary travels too.
    assert!(records.iter().any(|record| {
        record.get(keys::SUBCATEGORY).and_then(|v| v.as_str()) == Some("process")
    }));
}
