//! Console output for `tracing` events
//!
//! In the browser there is no stderr, so events are formatted by
//! `tracing_subscriber::fmt` and each one is handed to `console.log` /
//! `console.warn` / `console.error` as a single line.

use std::io;

use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

/// Where finished lines go
type Emit = fn(Level, &str);

fn to_console(level: Level, line: &str) {
    let line = line.into();
    match level {
        Level::ERROR => web_sys::console::error_1(&line),
        Level::WARN => web_sys::console::warn_1(&line),
        _ => web_sys::console::log_1(&line),
    }
}

/// Buffers one formatted event and emits it on drop
pub struct ConsoleWriter {
    level: Level,
    buf: Vec<u8>,
    emit: Emit,
}

impl ConsoleWriter {
    fn take_line(&mut self) -> Option<String> {
        let line = String::from_utf8_lossy(&self.buf).trim_end().to_string();
        self.buf.clear();
        (!line.is_empty()).then_some(line)
    }
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        if let Some(line) = self.take_line() {
            (self.emit)(self.level, &line);
        }
    }
}

#[derive(Clone, Copy)]
pub struct ConsoleMakeWriter {
    emit: Emit,
}

impl Default for ConsoleMakeWriter {
    fn default() -> Self {
        Self { emit: to_console }
    }
}

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer(Level::INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.writer(*meta.level())
    }
}

impl ConsoleMakeWriter {
    fn writer(&self, level: Level) -> ConsoleWriter {
        ConsoleWriter {
            level,
            buf: Vec::new(),
            emit: self.emit,
        }
    }
}

fn subscriber(
    make_writer: ConsoleMakeWriter,
    max_level: Level,
) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_writer(make_writer)
        .with_max_level(max_level)
        .with_ansi(false)
        // no wall clock on wasm32-unknown-unknown
        .without_time()
        .with_target(true)
        .finish()
}

/// Route `tracing` events at `max_level` and above to the browser console.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_console_logging(max_level: Level) {
    let _ = tracing::subscriber::set_global_default(subscriber(
        ConsoleMakeWriter::default(),
        max_level,
    ));
}
