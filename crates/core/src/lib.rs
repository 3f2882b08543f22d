//! Core utilities shared by every tilegpu crate.
//!
//! This crate provides foundational types used across the engine:
//! - Error types and result aliases
//! - Logging initialization and the start-up log level
//! - Engine configuration loaded from TOML
//! - Frame timing

mod config;
mod error;
mod logging;
mod timer;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use logging::{LogLevel, init_logging};
pub use timer::FrameTimer;
