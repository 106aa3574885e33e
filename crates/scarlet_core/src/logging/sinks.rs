//! Destinations for log records.
//!
//! Sinks are called from the drain thread only, but they may be flushed or
//! closed from another thread during shutdown, so each one serializes its own
//! writes.

use super::format::LogFormatter;
use super::level::LogLevel;
use super::record::LogRecord;
use crate::error::SinkError;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

/// A destination for drained log records.
pub trait LogSink: Send + Sync {
    fn name(&self) -> &str;

    fn append(&self, record: &LogRecord) -> Result<(), SinkError>;

    fn flush(&self) -> Result<(), SinkError>;

    /// Releases the sink's resources. Later appends fail or are ignored.
    fn close(&self) -> Result<(), SinkError> {
        self.flush()
    }
}

/// Writes formatted records to standard output, optionally colored by level.
pub struct ConsoleSink {
    formatter: LogFormatter,
    colored: bool,
}

impl ConsoleSink {
    pub fn new(formatter: LogFormatter, colored: bool) -> Self {
        Self { formatter, colored }
    }

    fn color(level: LogLevel) -> &'static str {
        match level {
            LogLevel::Trace => "\x1b[90m",
            LogLevel::Debug => "\x1b[37m",
            LogLevel::Info => "\x1b[97m",
            LogLevel::Warning => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Fatal => "\x1b[35m",
        }
    }
}

impl LogSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn append(&self, record: &LogRecord) -> Result<(), SinkError> {
        let line = self.formatter.format(record)?;
        let mut out = io::stdout().lock();
        if self.colored {
            writeln!(out, "{}{}\x1b[0m", Self::color(record.level), line)?;
        } else {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        io::stdout().lock().flush()?;
        Ok(())
    }
}

/// Appends formatted records to a file, creating parent directories.
pub struct FileSink {
    formatter: LogFormatter,
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>, formatter: LogFormatter) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("📝 Log file opened at {}", path.display());

        Ok(Self {
            formatter,
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn append(&self, record: &LogRecord) -> Result<(), SinkError> {
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| SinkError::Closed(self.path.display().to_string()))?;
        writeln!(writer, "{}", self.formatter.format(record)?)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.lock().as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.lock().take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to close log file {}: {}", self.path.display(), e);
        }
    }
}

/// Keeps formatted lines in memory. Useful for in-game consoles and tests.
pub struct MemorySink {
    formatter: LogFormatter,
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new(formatter: LogFormatter) -> Self {
        Self {
            formatter,
            lines: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every line written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn append(&self, record: &LogRecord) -> Result<(), SinkError> {
        let line = self.formatter.format(record)?;
        self.lines.lock().push(line);
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Forwards records to the active `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn append(&self, record: &LogRecord) -> Result<(), SinkError> {
        let message = &record.message;
        match record.level {
            LogLevel::Trace => trace!(target: "scarlet::log", "{}", message),
            LogLevel::Debug => debug!(target: "scarlet::log", "{}", message),
            LogLevel::Info => info!(target: "scarlet::log", "{}", message),
            LogLevel::Warning => warn!(target: "scarlet::log", "{}", message),
            LogLevel::Error => error!(target: "scarlet::log", "{}", message),
            LogLevel::Fatal => error!(target: "scarlet::log", fatal = true, "{}", message),
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
