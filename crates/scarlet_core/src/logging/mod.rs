//! Asynchronous logging service.
//!
//! Runtime services log through the [`Logger`] trait. The sandbox installs a
//! [`LogPipeline`] as its logger: records are buffered lock-free and written
//! to [`LogSink`]s by a background thread, either on a timer or as soon as a
//! batch has accumulated.

mod config;
mod format;
mod level;
mod logger;
mod pipeline;
mod record;
mod sinks;

pub use config::{LogConfig, LogFilter};
pub use format::LogFormatter;
pub use level::LogLevel;
pub use logger::{format_error_chain, Logger, TracingLogger, MAX_ERROR_CHAIN_DEPTH};
pub use pipeline::{LogPipeline, LogPipelineStats};
pub use record::LogRecord;
pub use sinks::{ConsoleSink, FileSink, LogSink, MemorySink, TracingSink};
