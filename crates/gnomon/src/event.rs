//! Ad-hoc event records.

use crate::build_mode::{BuildMode, RecordCategory};
use crate::lifecycle;
use crate::record::{keys, SourceLocation};

/// Emit a free-form message record with the standard identity keys and the
/// caller's source location.
#[track_caller]
pub fn message(subcategory: &str, text: &str) {
    if !BuildMode::enabled() {
        return;
    }
    let location = SourceLocation::caller();
    let state = lifecycle::process();
    let mut record = state.base_record(RecordCategory::Message);
    record.set(keys::SUBCATEGORY, subcategory);
    record.set(keys::MESSAGE, text);
    record.merge(location.to_record());
    lifecycle::submit(RecordCategory::Message, record);
}
