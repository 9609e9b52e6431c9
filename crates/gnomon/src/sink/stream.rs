//! Synchronized writers over shared process streams.

use std::fs::File;
use std::io::{self, Write};

use crate::path::{self, SinkTarget};

/// Line-buffering writer over a shared process stream.
///
/// Sinks targeting `<cout>`/`<cerr>`/`<clog>` share the stream with the host
/// application and with each other. Output is buffered until a newline and
/// written whole lines at a time under the stream lock, so concurrent
/// writers never interleave mid-line.
pub struct SyncStream {
    kind: StreamKind,
    buffer: Vec<u8>,
}

#[derive(Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

impl SyncStream {
    pub fn stdout() -> Self {
        Self {
            kind: StreamKind::Stdout,
            buffer: Vec::new(),
        }
    }

    pub fn stderr() -> Self {
        Self {
            kind: StreamKind::Stderr,
            buffer: Vec::new(),
        }
    }

    fn emit(&mut self, upto: usize) -> io::Result<()> {
        if upto == 0 {
            return Ok(());
        }
        match self.kind {
            StreamKind::Stdout => {
                let mut handle = io::stdout().lock();
                handle.write_all(&self.buffer[..upto])?;
            }
            StreamKind::Stderr => {
                let mut handle = io::stderr().lock();
                handle.write_all(&self.buffer[..upto])?;
            }
        }
        self.buffer.drain(..upto);
        Ok(())
    }
}

impl Write for SyncStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if let Some(newline) = self.buffer.iter().rposition(|&b| b == b'\n') {
            self.emit(newline + 1)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let len = self.buffer.len();
        self.emit(len)?;
        match self.kind {
            StreamKind::Stdout => io::stdout().lock().flush(),
            StreamKind::Stderr => io::stderr().lock().flush(),
        }
    }
}

/// Open a boxed writer for a sink path spec, resolving directory and stream
/// tokens.
pub(crate) fn open_target(path_spec: &str, extension: &str) -> io::Result<Box<dyn Write + Send>> {
    match path::resolve_target(path_spec, extension)? {
        SinkTarget::Stdout => Ok(Box::new(SyncStream::stdout())),
        SinkTarget::Stderr => Ok(Box::new(SyncStream::stderr())),
        SinkTarget::File(file_path) => {
            tracing::info!(path = %file_path.display(), "gnomon sink output");
            Ok(Box::new(File::create(file_path)?))
        }
    }
}
