//! Tagged values and insertion-ordered records.
//!
//! A [`Record`] is the unit of data flowing from instrumentation points to
//! sinks: a map from string keys to tagged values that preserves insertion
//! order, so serialized output reads the way the emitting code wrote it.
//! Records are immutable once handed to the pipeline and may be shared by
//! several sinks concurrently.
//!
//! # Data dictionary
//!
//! Well-known keys are defined in [`keys`] and must be used when applicable:
//! process/thread identity, `timestamp`, `build_mode`, `category` and
//! `subcategory`, source location (`file`, `line`, `column`, `function`,
//! `parent_function`), the scope tags (`subsystem`, `client`, `request`), and
//! `message`. Profile emissions add one key per counter and derived metric
//! under a `prof.` prefix with `.total`/`.self` suffixes.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Timestamps are local time with the zone offset preserved, so sink output
/// is meaningful to the operator reading it.
pub type Timestamp = chrono::DateTime<chrono::Local>;

/// Wire format for timestamps: ISO-8601 with nine fractional digits and a
/// numeric timezone offset, e.g. `2026-08-02T10:51:33.094816425+0200`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9f%z";

pub fn format_timestamp(timestamp: &Timestamp) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Well-known record keys.
pub mod keys {
    pub const PROCESS_NAME: &str = "process.name";
    pub const PROCESS_ID: &str = "process.id";
    pub const THREAD_ID: &str = "thread.id";
    pub const TIMESTAMP: &str = "timestamp";
    pub const BUILD_MODE: &str = "build_mode";
    pub const EVENT: &str = "event";
    pub const CATEGORY: &str = "category";
    pub const SUBCATEGORY: &str = "subcategory";
    pub const SUBSYSTEM: &str = "subsystem";
    pub const CLIENT: &str = "client";
    pub const REQUEST: &str = "request";
    pub const FILE: &str = "file";
    pub const LINE: &str = "line";
    pub const COLUMN: &str = "column";
    pub const FUNCTION: &str = "function";
    pub const PARENT_FUNCTION: &str = "parent_function";
    pub const MESSAGE: &str = "message";
}

/// A value carried in a record.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    Timestamp(Timestamp),
}

impl RecordValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RecordValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            RecordValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            RecordValue::Real(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&Timestamp> {
        match self {
            RecordValue::Timestamp(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for RecordValue {
    fn from(value: bool) -> Self {
        RecordValue::Bool(value)
    }
}

impl From<i64> for RecordValue {
    fn from(value: i64) -> Self {
        RecordValue::Int(value)
    }
}

impl From<i32> for RecordValue {
    fn from(value: i32) -> Self {
        RecordValue::Int(value.into())
    }
}

impl From<u32> for RecordValue {
    fn from(value: u32) -> Self {
        RecordValue::Int(value.into())
    }
}

impl From<u64> for RecordValue {
    fn from(value: u64) -> Self {
        RecordValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for RecordValue {
    fn from(value: f64) -> Self {
        RecordValue::Real(value)
    }
}

impl From<&str> for RecordValue {
    fn from(value: &str) -> Self {
        RecordValue::Str(value.to_owned())
    }
}

impl From<String> for RecordValue {
    fn from(value: String) -> Self {
        RecordValue::Str(value)
    }
}

impl From<Timestamp> for RecordValue {
    fn from(value: Timestamp) -> Self {
        RecordValue::Timestamp(value)
    }
}

impl Serialize for RecordValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RecordValue::Bool(value) => serializer.serialize_bool(*value),
            RecordValue::Int(value) => serializer.serialize_i64(*value),
            RecordValue::Real(value) => serializer.serialize_f64(*value),
            RecordValue::Str(value) => serializer.serialize_str(value),
            RecordValue::Timestamp(value) => serializer.serialize_str(&format_timestamp(value)),
        }
    }
}

/// Insertion-order-preserving map from string keys to tagged values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<String, RecordValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(capacity),
        }
    }

    /// Insert or update a field. Updating an existing key keeps its original
    /// position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<RecordValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&RecordValue> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RecordValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Append every field of `other`, overwriting duplicates in place.
    pub fn merge(&mut self, other: Record) {
        for (key, value) in other.fields {
            self.fields.insert(key, value);
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Source position captured at an instrumentation point.
///
/// The enclosing function signature travels separately (see the `function`
/// record key); `#[track_caller]` only reaches file, line, and column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    /// Location of the calling instrumentation point.
    #[track_caller]
    pub fn caller() -> Self {
        let location = core::panic::Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }

    pub fn to_record(&self) -> Record {
        let mut record = Record::with_capacity(3);
        record.set(keys::FILE, self.file);
        record.set(keys::LINE, self.line);
        record.set(keys::COLUMN, self.column);
        record
    }
}

impl core::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}({}:{})", self.file, self.line, self.column)
    }
}
