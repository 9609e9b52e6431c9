//! Newline-delimited JSON sink.
//!
//! One object per record per line, keys in insertion order, UTF-8, no
//! trailing whitespace. Timestamps use the wire format from
//! [`crate::record::TIMESTAMP_FORMAT`]; non-finite reals serialize as null.

use std::io::{self, BufWriter, Write};

use crate::record::Record;

use super::{stream, Sink};

pub struct JsonSink {
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl JsonSink {
    /// Open a sink at a path spec (`<temp>`, `<home>`, `<current>` directory
    /// tokens, or `<cout>`/`<clog>`/`<cerr>` stream tokens).
    ///
    /// # Errors
    ///
    /// Returns an error when the destination cannot be created.
    pub fn create(path_spec: &str) -> io::Result<JsonSink> {
        Ok(Self::from_writer(stream::open_target(path_spec, "json")?))
    }

    /// Sink writing to an arbitrary destination; useful for tests.
    pub fn from_writer(writer: Box<dyn Write + Send>) -> JsonSink {
        JsonSink {
            writer: BufWriter::new(writer),
        }
    }
}

impl Sink for JsonSink {
    fn write(&mut self, record: &Record) -> bool {
        match serde_json::to_string(record) {
            Ok(line) => writeln!(self.writer, "{line}").is_ok(),
            Err(_) => false,
        }
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

    #[test]
    fn writes_one_object_per_line() {
        let buffer = SharedBuffer::default();
        let mut sink = JsonSink::from_writer(Box::new(buffer.clone()));

        let mut first = Record::new();
        first.set("event", "begin");
        let mut second = Record::new();
        second.set("event", "end");
        second.set("count", 2i64);

        assert!(sink.write(&first));
        assert!(sink.write(&second));
        sink.flush();

        let written = buffer.0.lock().unwrap().clone();
        let text = String::from_utf8(written).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"event":"begin"}"#);
        assert_eq!(lines[1], r#"{"event":"end","count":2}"#);
        assert!(text.ends_with('\n'));
    }
}
