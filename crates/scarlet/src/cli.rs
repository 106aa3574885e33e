//! Command-line interface for the Scarlet runtime host.

use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

/// Command line arguments.
///
/// Every option overrides the matching setting from the configuration file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Sandbox preset replacing the `[sandbox]` table
    pub preset: Option<String>,
    pub log_level: Option<String>,
    pub json_logs: bool,
    /// Stop after this many ticks
    pub ticks: Option<u64>,
    pub tick_ms: Option<u64>,
}

impl CliArgs {
    pub fn parse() -> Self {
        Self::from_matches(Self::command().get_matches())
    }

    fn command() -> Command {
        Command::new("Scarlet Runtime")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Hosts a Scarlet sandbox and drives its tick loop")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("config.toml"),
            )
            .arg(
                Arg::new("preset")
                    .short('p')
                    .long("preset")
                    .value_name("NAME")
                    .help("Sandbox preset (default, debug, release, minimal)"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("ticks")
                    .short('n')
                    .long("ticks")
                    .value_name("COUNT")
                    .help("Exit after this many ticks")
                    .value_parser(clap::value_parser!(u64)),
            )
            .arg(
                Arg::new("tick-ms")
                    .long("tick-ms")
                    .value_name("MILLIS")
                    .help("Tick interval in milliseconds")
                    .value_parser(clap::value_parser!(u64)),
            )
    }

    fn from_matches(matches: clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            preset: matches.get_one::<String>("preset").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            ticks: matches.get_one::<u64>("ticks").copied(),
            tick_ms: matches.get_one::<u64>("tick-ms").copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::from_matches(CliArgs::command().get_matches_from(["scarlet"]));
        assert_eq!(args.config_path, PathBuf::from("config.toml"));
        assert!(args.preset.is_none());
        assert!(!args.json_logs);
        assert!(args.ticks.is_none());
    }

    #[test]
    fn test_overrides() {
        let matches = CliArgs::command().get_matches_from([
            "scarlet",
            "--config",
            "game.toml",
            "--preset",
            "debug",
            "--json-logs",
            "-n",
            "30",
            "--tick-ms",
            "8",
        ]);
        let args = CliArgs::from_matches(matches);
        assert_eq!(args.config_path, PathBuf::from("game.toml"));
        assert_eq!(args.preset.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert_eq!(args.ticks, Some(30));
        assert_eq!(args.tick_ms, Some(8));
    }
}
