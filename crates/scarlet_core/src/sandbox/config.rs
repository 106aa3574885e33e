use crate::error::ConfigError;
use crate::event_bus::EventBusConfig;
use crate::logging::{LogConfig, LogLevel};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything a [`Sandbox`](super::Sandbox) needs to build its baseline services.
///
/// # Examples
///
/// ```rust
/// use scarlet_core::{LogLevel, SandboxConfig};
///
/// let config = SandboxConfig::from_toml_str(r#"
///     max_actions_per_update = 32
///
///     [log]
///     min_level = "debug"
///
///     [event_bus]
///     buffer_full_policy = "reject"
/// "#).unwrap();
///
/// assert_eq!(config.max_actions_per_update, 32);
/// assert_eq!(config.log.min_level, LogLevel::Debug);
/// assert_eq!(config.action_buffer_size, 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Capacity of the main-thread action queue.
    pub action_buffer_size: usize,
    pub max_actions_per_update: usize,
    /// Size of a dedicated worker pool; the shared pool when absent.
    pub worker_threads: Option<usize>,
    pub log: LogConfig,
    pub event_bus: EventBusConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            action_buffer_size: 1024,
            max_actions_per_update: 64,
            worker_threads: None,
            log: LogConfig::default(),
            event_bus: EventBusConfig::default(),
        }
    }
}

impl SandboxConfig {
    /// Verbose logging, flushed almost immediately.
    pub fn debug() -> Self {
        let mut config = Self::default();
        config.log.min_level = LogLevel::Debug;
        config.log.batch_size = 100;
        config.log.flush_interval_ms = 10;
        config.log.include_stack_trace_for_error = true;
        config
    }

    /// Informational logging in large batches.
    pub fn release() -> Self {
        let mut config = Self::default();
        config.log.min_level = LogLevel::Info;
        config.log.batch_size = 1000;
        config.log.flush_interval_ms = 100;
        config.log.include_stack_trace_for_error = false;
        config
    }

    /// Warnings and above only, without timestamps.
    pub fn minimal() -> Self {
        let mut config = Self::default();
        config.log.min_level = LogLevel::Warning;
        config.log.include_timestamp = false;
        config.log.include_stack_trace_for_error = false;
        config.log.batch_size = 2000;
        config.log.flush_interval_ms = 200;
        config
    }

    /// Looks up a preset by name: `default`, `debug`, `release` or `minimal`.
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "default" => Some(Self::default()),
            "debug" => Some(Self::debug()),
            "release" => Some(Self::release()),
            "minimal" => Some(Self::minimal()),
            _ => None,
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.action_buffer_size == 0 || self.max_actions_per_update == 0 {
            return Err(ConfigError::Invalid(
                "main-thread action queue needs a positive size and cap".to_string(),
            ));
        }
        self.log.validate()
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reads a TOML file; missing keys take their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
