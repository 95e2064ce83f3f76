//! Per-test output sinks.
//!
//! A sink buffers everything a test writes (explicit lines and captured
//! `tracing` events), optionally tees it to a file, and is released exactly
//! once no matter how many times `close` is called.

use crate::harness::TestUnit;
use crate::result::{EsperarError, EsperarResult};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Default)]
struct SinkState {
    buffer: Vec<u8>,
    file: Option<BufWriter<File>>,
    path: Option<PathBuf>,
    closed: bool,
    releases: usize,
}

/// Shared handle to one test's output
#[derive(Clone, Default)]
pub struct OutputSink {
    state: Arc<Mutex<SinkState>>,
}

impl OutputSink {
    /// Memory-only sink
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Sink that also writes to `path`
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error when the file cannot be created.
    pub fn to_file(path: impl AsRef<Path>) -> EsperarResult<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            EsperarError::infrastructure(format!(
                "cannot create output sink {}: {e}",
                path.display()
            ))
        })?;
        let sink = Self::default();
        {
            let mut state = sink.lock();
            state.file = Some(BufWriter::new(file));
            state.path = Some(path.to_path_buf());
        }
        Ok(sink)
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a line; ignored after close
    pub fn write_line(&self, line: &str) {
        let mut sink = self.clone();
        let _ = writeln!(sink, "{line}");
    }

    /// Everything written so far
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock().buffer).into_owned()
    }

    /// File backing this sink, if any
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    /// Flush and release the sink. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the final flush fails.
    pub fn close(&self) -> EsperarResult<()> {
        let mut state = self.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.releases += 1;
        if let Some(mut file) = state.file.take() {
            file.flush()
                .map_err(|e| EsperarError::infrastructure(format!("cannot flush output sink: {e}")))?;
        }
        Ok(())
    }

    /// Whether the sink has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// How many times the underlying resource was released (0 or 1)
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.lock().releases
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("OutputSink")
            .field("bytes", &state.buffer.len())
            .field("path", &state.path)
            .field("closed", &state.closed)
            .finish()
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.closed {
            return Ok(buf.len());
        }
        state.buffer.extend_from_slice(buf);
        if let Some(file) = state.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock().file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for OutputSink {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// =============================================================================
// FACTORIES
// =============================================================================

/// Creates the sink for one execution
pub trait SinkFactory: Send + Sync + fmt::Debug {
    /// Sink for `unit`, distinguished by `qualifier`
    ///
    /// # Errors
    ///
    /// Infrastructure error when the sink cannot be created.
    fn create(&self, unit: &TestUnit, qualifier: &str) -> EsperarResult<OutputSink>;
}

/// Memory-only sinks
#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySinkFactory;

impl SinkFactory for MemorySinkFactory {
    fn create(&self, _unit: &TestUnit, _qualifier: &str) -> EsperarResult<OutputSink> {
        Ok(OutputSink::in_memory())
    }
}

/// One log file per execution under a directory
#[derive(Debug, Clone)]
pub struct FileSinkFactory {
    dir: PathBuf,
}

impl FileSinkFactory {
    /// Write sinks under `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File name for `unit`: `{suite}.{method}.{qualifier}.log`
    ///
    /// Bytes outside `[A-Za-z0-9-]` are written as `_xx` hex, so distinct
    /// units never share a file.
    #[must_use]
    pub fn file_name(unit: &TestUnit, qualifier: &str) -> String {
        let mut name = escape_component(&unit.suite);
        name.push('.');
        name.push_str(&escape_component(&unit.method));
        if !qualifier.is_empty() {
            name.push('.');
            name.push_str(&escape_component(qualifier));
        }
        name.push_str(".log");
        name
    }
}

fn escape_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("_{byte:02x}"));
        }
    }
    out
}

impl SinkFactory for FileSinkFactory {
    fn create(&self, unit: &TestUnit, qualifier: &str) -> EsperarResult<OutputSink> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            EsperarError::infrastructure(format!(
                "cannot create output directory {}: {e}",
                self.dir.display()
            ))
        })?;
        OutputSink::to_file(self.dir.join(Self::file_name(unit, qualifier)))
    }
}
