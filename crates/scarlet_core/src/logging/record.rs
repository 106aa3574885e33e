use super::level::LogLevel;
use chrono::{DateTime, Utc};

/// One log entry as it travels through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    /// Creates a record stamped with the current UTC time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
