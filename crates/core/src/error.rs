//! Error types shared by the engine crates.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the engine's ambient layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Presentation surface creation errors
    #[error("Surface error: {0}")]
    Surface(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse config '{path}': {source}")]
    ConfigParse {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// Configuration values are invalid
    #[error("Config error: {0}")]
    Config(String),

    /// Unknown log level name
    #[error("Unknown log level '{0}' (expected error, warn, info or trace)")]
    UnknownLogLevel(String),
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
