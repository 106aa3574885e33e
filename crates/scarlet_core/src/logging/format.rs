use super::config::LogConfig;
use super::record::LogRecord;
use crate::error::SinkError;
use std::fmt::Write;

/// Renders records as `timestamp [Level] message`.
#[derive(Debug, Clone)]
pub struct LogFormatter {
    include_timestamp: bool,
    include_level: bool,
    timestamp_format: String,
}

impl LogFormatter {
    pub fn new(config: &LogConfig) -> Self {
        Self {
            include_timestamp: config.include_timestamp,
            include_level: config.include_level,
            timestamp_format: config.timestamp_format.clone(),
        }
    }

    /// Formats `record` without a trailing newline.
    ///
    /// Fails when the timestamp format string is not a valid `chrono` pattern.
    pub fn format(&self, record: &LogRecord) -> Result<String, SinkError> {
        let mut line = String::with_capacity(record.message.len() + 40);

        if self.include_timestamp {
            write!(line, "{} ", record.timestamp.format(&self.timestamp_format)).map_err(|_| {
                SinkError::Format(format!("bad timestamp format '{}'", self.timestamp_format))
            })?;
        }
        if self.include_level {
            line.push('[');
            line.push_str(record.level.as_str());
            line.push_str("] ");
        }
        line.push_str(&record.message);
        Ok(line)
    }
}

impl Default for LogFormatter {
    fn default() -> Self {
        Self::new(&LogConfig::default())
    }
}
