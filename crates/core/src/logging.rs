//! Logging initialization and the start-up log level.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};

use crate::error::Error;

/// Verbosity chosen once at start-up.
///
/// Ordered from least to most verbose, so `level >= LogLevel::Info`
/// reads as "at least info".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Trace,
}

impl LogLevel {
    /// Returns the tracing filter directive for this level.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Trace => "trace",
        }
    }

    /// Whether Vulkan validation layers should be requested by default.
    ///
    /// Validation output is only useful when it can actually be seen, so
    /// it is tied to `Info` or more verbose in debug builds.
    pub fn enables_validation(self) -> bool {
        cfg!(debug_assertions) && self >= LogLevel::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(Error::UnknownLogLevel(s.to_string())),
        }
    }
}

/// Initialize the logging system with tracing.
///
/// This sets up tracing-subscriber with:
/// - Environment-based filtering (`RUST_LOG` overrides `level`)
/// - Target and thread ids on every line
///
/// Returns whether this call installed the global subscriber. A later call
/// keeps the existing one and logs why through it.
///
/// # Example
/// ```
/// tilegpu_core::init_logging(tilegpu_core::LogLevel::Info);
/// tracing::info!("Engine starting");
/// ```
pub fn init_logging(level: LogLevel) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_thread_ids(true),
        )
        .try_init();

    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Logging already initialized, keeping existing subscriber: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level_is_warn() {
        assert_eq!(LogLevel::default(), LogLevel::Warn);
    }

    #[test]
    fn test_levels_are_ordered_by_verbosity() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Trace);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_validation_follows_level() {
        assert!(!LogLevel::Error.enables_validation());
        assert!(!LogLevel::Warn.enables_validation());
        assert_eq!(LogLevel::Trace.enables_validation(), cfg!(debug_assertions));
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging(LogLevel::Warn);
        // A subscriber is installed by now, whichever call made it
        assert!(!init_logging(LogLevel::Trace));
    }
}
