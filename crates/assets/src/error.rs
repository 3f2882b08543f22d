//! Error types for asset loading.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for asset loading operations.
#[derive(Error, Debug)]
pub enum AssetError {
    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error while reading a file.
    #[error("Failed to read '{path}': {source}")]
    Io {
        /// Path of the file being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Image decoding error.
    #[error("Failed to decode image '{path}': {source}")]
    Image {
        /// Path of the image.
        path: PathBuf,
        /// Underlying decoder error.
        source: image::ImageError,
    },

    /// Level file is not valid TOML or has the wrong shape.
    #[error("Failed to parse level '{path}': {source}")]
    LevelParse {
        /// Path of the level file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// Level file parsed but its contents are inconsistent.
    #[error("Invalid level '{path}': {message}")]
    InvalidLevel {
        /// Path of the level file.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },

    /// Pixel buffer dimensions do not match its data, or a crop is out of bounds.
    #[error("Invalid pixel data: {0}")]
    InvalidPixels(String),
}

/// Result type alias for asset operations.
pub type AssetResult<T> = Result<T, AssetError>;
