//! Delimited-text sink with a fixed column projection.
//!
//! The projection (which keys become columns, in what order) is fixed at
//! creation time; a header row is written first. Missing keys produce empty
//! fields, strings and timestamps are wrapped in the configured quote
//! character.

use std::io::{self, BufWriter, Write};

use crate::record::{format_timestamp, Record, RecordValue};

use super::{stream, Sink};

pub struct TableSink {
    fields: Vec<String>,
    separator: String,
    quote: String,
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl TableSink {
    /// Open a sink at a path spec with the given column projection.
    ///
    /// # Errors
    ///
    /// Returns an error when the destination cannot be created or the header
    /// row cannot be written.
    pub fn create(
        fields: Vec<String>,
        path_spec: &str,
        separator: &str,
        quote: &str,
    ) -> io::Result<TableSink> {
        Self::from_writer(fields, stream::open_target(path_spec, "txt")?, separator, quote)
    }

    /// Sink writing to an arbitrary destination; useful for tests.
    pub fn from_writer(
        fields: Vec<String>,
        writer: Box<dyn Write + Send>,
        separator: &str,
        quote: &str,
    ) -> io::Result<TableSink> {
        let mut sink = TableSink {
            fields,
            separator: separator.to_owned(),
            quote: quote.to_owned(),
            writer: BufWriter::new(writer),
        };
        let header = sink.fields.join(&sink.separator);
        writeln!(sink.writer, "{header}")?;
        Ok(sink)
    }

    fn format_value(&self, value: &RecordValue) -> String {
        match value {
            RecordValue::Bool(b) => b.to_string(),
            RecordValue::Int(i) => i.to_string(),
            RecordValue::Real(r) => r.to_string(),
            RecordValue::Str(s) => format!("{q}{s}{q}", q = self.quote),
            RecordValue::Timestamp(ts) => {
                format!("{q}{}{q}", format_timestamp(ts), q = self.quote)
            }
        }
    }
}

impl Sink for TableSink {
    fn write(&mut self, record: &Record) -> bool {
        let mut row = String::new();
        for (position, field) in self.fields.iter().enumerate() {
            if position > 0 {
                row.push_str(&self.separator);
            }
            if let Some(value) = record.get(field) {
                row.push_str(&self.format_value(value));
            }
        }
        writeln!(self.writer, "{row}").is_ok()
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn columns() -> Vec<String> {
        vec![
            String::from("function"),
            String::from("prof.calls"),
            String::from("subsystem"),
        ]
    }

    #[test]
    fn projects_fields_in_configured_order() {
        let buffer = SharedBuffer::default();
        let mut sink =
            TableSink::from_writer(columns(), Box::new(buffer.clone()), ",", "\"").unwrap();

        let mut record = Record::new();
        record.set("subsystem", "db");
        record.set("prof.calls", 17i64);
        record.set("function", "query");
        record.set("unprojected", true);
        assert!(sink.write(&record));
        sink.flush();

        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "function,prof.calls,subsystem");
        assert_eq!(lines[1], "\"query\",17,\"db\"");
    }

    #[test]
    fn missing_keys_leave_empty_fields() {
        let buffer = SharedBuffer::default();
        let mut sink =
            TableSink::from_writer(columns(), Box::new(buffer.clone()), ";", "'").unwrap();

        let mut record = Record::new();
        record.set("function", "idle");
        assert!(sink.write(&record));
        sink.flush();

        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().nth(1).unwrap(), "'idle';;");
    }
}
