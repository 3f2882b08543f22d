//! Platform layer for tilegpu.
//!
//! This crate provides the window-side collaborators of the renderer:
//! - Window creation via winit, sized from the primary display
//! - Drawable size queries for swapchain extent derivation
//! - Presentation surface creation and surface capability queries

mod window;

pub use window::{Surface, Window, required_extensions};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
