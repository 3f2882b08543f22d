//! Engine configuration.
//!
//! Configuration is read from a TOML file. Every field has a default, so an
//! empty file (or no file at all) yields a working setup.
//!
//! ```toml
//! log_level = "info"
//! window_title = "tilegpu"
//! level = "assets/levels/first.toml"
//! max_consecutive_frame_failures = 8
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::logging::LogLevel;

/// Top-level engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Log level used when no command-line flag overrides it.
    pub log_level: LogLevel,
    /// Force validation layers on or off. `None` derives it from the log level.
    pub validation: Option<bool>,
    /// Window title.
    pub window_title: String,
    /// Explicit window size. `None` uses half of the primary display.
    pub window_size: Option<[u32; 2]>,
    /// Pre-compiled vertex shader blob.
    pub vertex_shader: PathBuf,
    /// Pre-compiled fragment shader blob.
    pub fragment_shader: PathBuf,
    /// Tile-map level loaded at start-up.
    pub level: Option<PathBuf>,
    /// Initial capacity of the object registry.
    pub initial_object_capacity: usize,
    /// Maximum number of live textured objects the descriptor pool is sized for.
    pub max_objects: u32,
    /// Consecutive non-transient frame failures tolerated before giving up.
    pub max_consecutive_frame_failures: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            validation: None,
            window_title: "tilegpu".to_string(),
            window_size: None,
            vertex_shader: PathBuf::from("shaders/sprite.vert.spv"),
            fragment_shader: PathBuf::from("shaders/sprite.frag.spv"),
            level: None,
            initial_object_capacity: 64,
            max_objects: 1024,
            max_consecutive_frame_failures: 16,
        }
    }
}

impl EngineConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.initial_object_capacity == 0 {
            return Err(Error::Config(
                "initial_object_capacity must be greater than 0".to_string(),
            ));
        }
        if self.max_objects == 0 {
            return Err(Error::Config("max_objects must be greater than 0".to_string()));
        }
        if self.max_consecutive_frame_failures == 0 {
            return Err(Error::Config(
                "max_consecutive_frame_failures must be greater than 0".to_string(),
            ));
        }
        if self.vertex_shader.as_os_str().is_empty() || self.fragment_shader.as_os_str().is_empty()
        {
            return Err(Error::Config("shader paths must not be empty".to_string()));
        }
        if let Some([w, h]) = self.window_size
            && (w == 0 || h == 0)
        {
            return Err(Error::Config(format!("window_size {w}x{h} has a zero axis")));
        }
        Ok(())
    }

    /// Whether validation layers should be enabled for `level`.
    pub fn validation_enabled(&self, level: LogLevel) -> bool {
        self.validation.unwrap_or_else(|| level.enables_validation())
    }
}
