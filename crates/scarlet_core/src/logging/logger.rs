use super::level::LogLevel;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt::Write;
use tracing::{debug, error, info, trace, warn};

/// Deepest `source()` level rendered by [`format_error_chain`].
pub const MAX_ERROR_CHAIN_DEPTH: usize = 10;

/// Leveled logging interface used by runtime services.
///
/// Only [`log`](Logger::log) is required; the leveled helpers forward to it.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message)
    }

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message)
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message)
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warning, message)
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message)
    }

    fn fatal(&self, message: &str) {
        self.log(LogLevel::Fatal, message)
    }

    /// Logs `message` at `Error` level followed by the error and its sources.
    fn log_error_with(&self, message: &str, error: &dyn Error) {
        self.log(LogLevel::Error, &format_error_chain(message, error, false))
    }
}

/// Renders `context`, `error` and up to ten levels of `source()` errors.
///
/// Each source goes on its own line prefixed with `--->`, and a captured
/// backtrace is appended when `include_backtrace` is set.
pub fn format_error_chain(context: &str, error: &dyn Error, include_backtrace: bool) -> String {
    let mut rendered = String::new();
    let _ = write!(rendered, "{context}: {error}");

    let mut depth = 0;
    let mut source = error.source();
    while let Some(inner) = source {
        if depth >= MAX_ERROR_CHAIN_DEPTH {
            rendered.push_str("\n ---> (further causes omitted)");
            break;
        }
        let _ = write!(rendered, "\n ---> {inner}");
        source = inner.source();
        depth += 1;
    }

    if include_backtrace {
        let _ = write!(rendered, "\nBacktrace:\n{}", Backtrace::force_capture());
    }
    rendered
}

/// Logger that forwards to the active `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => trace!("{}", message),
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warning => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
            LogLevel::Fatal => error!(fatal = true, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Layer {
        name: &'static str,
        cause: Option<Box<Layer>>,
    }

    impl fmt::Display for Layer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.name)
        }
    }

    impl Error for Layer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            self.cause.as_deref().map(|cause| cause as &(dyn Error + 'static))
        }
    }

    fn chain(depth: usize) -> Layer {
        let mut layer = Layer {
            name: "root",
            cause: None,
        };
        for _ in 0..depth {
            layer = Layer {
                name: "wrapper",
                cause: Some(Box::new(layer)),
            };
        }
        layer
    }

    #[test]
    fn test_error_chain_lists_sources() {
        let rendered = format_error_chain("asset load failed", &chain(2), false);
        assert_eq!(
            rendered,
            "asset load failed: wrapper\n ---> wrapper\n ---> root"
        );
    }

    #[test]
    fn test_error_chain_is_capped() {
        let rendered = format_error_chain("deep", &chain(25), false);
        assert_eq!(rendered.matches("--->").count(), MAX_ERROR_CHAIN_DEPTH + 1);
        assert!(rendered.ends_with("(further causes omitted)"));
    }
}
