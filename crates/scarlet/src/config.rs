//! Host configuration loaded from TOML.

use scarlet_core::SandboxConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

fn default_tick_interval() -> u64 {
    16
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Passed to the sandbox unchanged
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

/// Tick loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Milliseconds between two sandbox updates
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Stop after this many ticks; run until a signal arrives when absent
    #[serde(default)]
    pub max_ticks: Option<u64>,
    /// Emit a heartbeat event every this many ticks
    #[serde(default = "default_heartbeat_every")]
    pub heartbeat_every: u64,
}

fn default_heartbeat_every() -> u64 {
    60
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            max_ticks: None,
            heartbeat_every: default_heartbeat_every(),
        }
    }
}

/// Host-side `tracing` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// A missing file is created with the default configuration.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.runtime.tick_interval_ms == 0 {
            return Err("Tick interval must be at least 1ms".to_string());
        }
        if self.runtime.heartbeat_every == 0 {
            return Err("Heartbeat interval must be at least one tick".to_string());
        }
        if self.sandbox.action_buffer_size == 0 {
            return Err("Main-thread action buffer cannot be empty".to_string());
        }
        if self.sandbox.max_actions_per_update == 0 {
            return Err("max_actions_per_update must be positive".to_string());
        }
        if self.sandbox.event_bus.buffer_size == 0 {
            return Err("Event bus buffer cannot be empty".to_string());
        }
        self.sandbox.log.validate().map_err(|e| e.to_string())?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scarlet_core::{BufferFullPolicy, LogLevel};
    use tempfile::NamedTempFile;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.runtime.tick_interval_ms, 16);
        assert!(config.runtime.max_ticks.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.sandbox.max_actions_per_update, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.runtime.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        config.runtime.tick_interval_ms = 16;
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "warn".to_string();
        config.sandbox.event_bus.buffer_size = 0;
        assert!(config.validate().is_err());

        config.sandbox.event_bus.buffer_size = 64;
        config.sandbox.log.timestamp_format = "%Q".to_string();
        assert!(config.validate().unwrap_err().contains("timestamp_format"));
    }

    #[tokio::test]
    async fn test_load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scarlet.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.runtime.tick_interval_ms, 16);
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.sandbox.log.batch_size, config.sandbox.log.batch_size);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[runtime]
tick_interval_ms = 33
max_ticks = 120

[logging]
level = "debug"
json_format = true

[sandbox]
max_actions_per_update = 16

[sandbox.log]
min_level = "warning"

[sandbox.event_bus]
buffer_full_policy = "wait_for_space"
"#;

        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.runtime.tick_interval_ms, 33);
        assert_eq!(config.runtime.max_ticks, Some(120));
        assert_eq!(config.runtime.heartbeat_every, 60);
        assert!(config.logging.json_format);
        assert_eq!(config.sandbox.max_actions_per_update, 16);
        assert_eq!(config.sandbox.action_buffer_size, 1024);
        assert_eq!(config.sandbox.log.min_level, LogLevel::Warning);
        assert_eq!(
            config.sandbox.event_bus.buffer_full_policy,
            BufferFullPolicy::WaitForSpace
        );
    }
}
