//! Command-line interface.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use tilegpu_core::LogLevel;

/// Tile-map sprite viewer.
#[derive(Parser, Debug)]
#[command(name = "tilegpu", version, about, long_about = None)]
#[command(group(ArgGroup::new("verbosity").args(["error", "warn", "info", "trace"])))]
pub struct Cli {
    /// Only log errors
    #[arg(long)]
    pub error: bool,

    /// Log warnings and errors
    #[arg(long)]
    pub warn: bool,

    /// Log progress information
    #[arg(long)]
    pub info: bool,

    /// Log everything, including per-object and per-frame diagnostics
    #[arg(long)]
    pub trace: bool,

    /// Engine configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Tile-map level to load, overriding the configuration
    #[arg(long, value_name = "FILE")]
    pub level: Option<PathBuf>,
}

impl Cli {
    /// The level picked by a verbosity flag, if any.
    pub fn log_level(&self) -> Option<LogLevel> {
        if self.error {
            Some(LogLevel::Error)
        } else if self.warn {
            Some(LogLevel::Warn)
        } else if self.info {
            Some(LogLevel::Info)
        } else if self.trace {
            Some(LogLevel::Trace)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_flags() {
        let cli = Cli::try_parse_from(["tilegpu"]).unwrap();
        assert_eq!(cli.log_level(), None);
        assert!(cli.config.is_none());
        assert!(cli.level.is_none());
    }

    #[test]
    fn test_each_verbosity_flag() {
        for (flag, level) in [
            ("--error", LogLevel::Error),
            ("--warn", LogLevel::Warn),
            ("--info", LogLevel::Info),
            ("--trace", LogLevel::Trace),
        ] {
            let cli = Cli::try_parse_from(["tilegpu", flag]).unwrap();
            assert_eq!(cli.log_level(), Some(level), "{flag}");
        }
    }

    #[test]
    fn test_verbosity_flags_are_exclusive() {
        let result = Cli::try_parse_from(["tilegpu", "--info", "--trace"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_paths() {
        let cli = Cli::try_parse_from([
            "tilegpu",
            "--config",
            "engine.toml",
            "--level",
            "levels/one.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("engine.toml")));
        assert_eq!(cli.level, Some(PathBuf::from("levels/one.toml")));
    }
}
