//! Scarlet runtime host.
//!
//! Loads the configuration, sets up `tracing`, builds a sandbox on the main
//! thread and ticks it until a shutdown signal arrives.

mod app;
mod cli;
mod config;
mod signals;

use anyhow::Context;
use app::Application;
use cli::CliArgs;
use config::{AppConfig, LoggingSettings};
use scarlet_core::SandboxConfig;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global `tracing` subscriber.
fn setup_logging(config: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_names(true),
            )
            .init();
    }

    info!("🔧 Logging initialized with level: {}", config.level);
}

async fn load(args: &CliArgs) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .with_context(|| format!("loading {}", args.config_path.display()))?;

    if let Some(name) = &args.preset {
        config.sandbox = SandboxConfig::preset(name)
            .with_context(|| format!("unknown sandbox preset '{name}'"))?;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if let Some(tick_ms) = args.tick_ms {
        config.runtime.tick_interval_ms = tick_ms;
    }
    if let Some(ticks) = args.ticks {
        config.runtime.max_ticks = Some(ticks);
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;
    Ok(config)
}

// Sandbox::update must run on the thread that built the sandbox.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = match load(&args).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to start: {e:#}");
            std::process::exit(1);
        }
    };

    setup_logging(&config.logging);
    info!(
        "🚀 Scarlet runtime v{} | config: {}",
        env!("CARGO_PKG_VERSION"),
        args.config_path.display()
    );

    let max_ticks = config.runtime.max_ticks;
    let app = Application::new(config)?;
    if let Err(e) = app.run(max_ticks).await {
        error!("❌ Runtime error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
