//! Frame lifecycle and object management for tilegpu.
//!
//! This crate orchestrates the rendering process:
//! - Frame slots and the per-frame acquire/record/submit/present sequence
//! - The object registry and each object's GPU resources
//! - Level loading, one textured quad per tile
//! - Resource destruction in dependency order

pub mod draw;
pub mod error;
pub mod frame;
pub mod frame_manager;
pub mod level;
pub mod object;
pub mod registry;
pub mod renderer;
pub mod texture;

pub use error::{RenderError, RenderResult};
pub use frame_manager::{FrameDriver, FrameOutcome};
pub use object::{GpuObject, ObjectId, TextureSource};
pub use registry::ObjectRegistry;
pub use renderer::Renderer;

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
