use super::level::LogLevel;
use super::record::LogRecord;
use crate::error::ConfigError;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Predicate deciding whether a record is buffered at all.
pub type LogFilter = Arc<dyn Fn(&LogRecord) -> bool + Send + Sync>;

/// Settings of a [`LogPipeline`](super::LogPipeline) and its formatters.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Records below this level are dropped before buffering.
    pub min_level: LogLevel,
    /// Capacity of each of the two record buffers.
    pub max_queue_size: usize,
    /// In-flight record count that triggers an early flush.
    pub batch_size: usize,
    /// Drain on a background thread instead of the logging thread.
    pub enable_async_logging: bool,
    pub flush_interval_ms: u64,
    pub include_timestamp: bool,
    pub include_level: bool,
    /// `chrono` format string.
    pub timestamp_format: String,
    /// Attach a backtrace to every `log_error_with` record.
    pub include_stack_trace: bool,
    /// Attach a backtrace to `log_error_with` records of level `Error` and above.
    pub include_stack_trace_for_error: bool,
    pub console_output: bool,
    pub colored_console: bool,
    pub file_path: Option<PathBuf>,
    #[serde(skip)]
    pub custom_filter: Option<LogFilter>,
}

impl LogConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    /// Rejects settings the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid("log max_queue_size must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("log batch_size must be positive".to_string()));
        }
        if StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Invalid(format!(
                "unsupported timestamp_format '{}'",
                self.timestamp_format
            )));
        }
        Ok(())
    }

    /// Returns a copy that only buffers records accepted by `filter`.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&LogRecord) -> bool + Send + Sync + 'static,
    {
        self.custom_filter = Some(Arc::new(filter));
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            max_queue_size: 8192,
            batch_size: 100,
            enable_async_logging: true,
            flush_interval_ms: 1000,
            include_timestamp: true,
            include_level: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            include_stack_trace: false,
            include_stack_trace_for_error: false,
            console_output: true,
            colored_console: true,
            file_path: None,
            custom_filter: None,
        }
    }
}

impl fmt::Debug for LogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogConfig")
            .field("min_level", &self.min_level)
            .field("max_queue_size", &self.max_queue_size)
            .field("batch_size", &self.batch_size)
            .field("enable_async_logging", &self.enable_async_logging)
            .field("flush_interval_ms", &self.flush_interval_ms)
            .field("include_timestamp", &self.include_timestamp)
            .field("include_level", &self.include_level)
            .field("timestamp_format", &self.timestamp_format)
            .field("include_stack_trace", &self.include_stack_trace)
            .field("include_stack_trace_for_error", &self.include_stack_trace_for_error)
            .field("console_output", &self.console_output)
            .field("colored_console", &self.colored_console)
            .field("file_path", &self.file_path)
            .field("custom_filter", &self.custom_filter.is_some())
            .finish()
    }
}
