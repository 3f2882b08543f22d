//! Window management using winit.
//!
//! This module provides window creation, drawable-size queries and Vulkan
//! presentation surface creation.

use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window as WinitWindow, WindowAttributes};

use tilegpu_core::{Error, Result};

/// Size used when no monitor can be queried.
const FALLBACK_SIZE: (u32, u32) = (1280, 720);

/// RAII wrapper for a Vulkan presentation surface.
///
/// This struct owns a `vk::SurfaceKHR` handle and destroys it on drop. The
/// loader is kept alongside so the swapchain can query capabilities.
///
/// # Ownership
/// The caller must ensure that the Vulkan instance outlives this surface.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Get the raw Vulkan surface handle.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Get a reference to the surface loader.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: The surface was created by ash_window::create_surface from the
        // same instance as the loader, and this is the only place it is destroyed.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// A window wrapper exposing the drawable size and surface creation.
pub struct Window {
    window: Arc<WinitWindow>,
}

impl Window {
    /// Create a resizable window.
    ///
    /// With `size == None` the window covers half of the primary display in
    /// each axis.
    pub fn new(event_loop: &ActiveEventLoop, title: &str, size: Option<[u32; 2]>) -> Result<Self> {
        let (width, height) = match size {
            Some([w, h]) => (w, h),
            None => half_of_display(
                event_loop
                    .primary_monitor()
                    .map(|monitor| monitor.size())
                    .map(|s| (s.width, s.height)),
            ),
        };

        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Created window with size: {}x{}", width, height);

        Ok(Self {
            window: Arc::new(window),
        })
    }

    /// Size of the drawable area in physical pixels.
    pub fn drawable_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Switch between windowed and borderless fullscreen.
    pub fn toggle_fullscreen(&self) {
        if self.window.fullscreen().is_some() {
            self.window.set_fullscreen(None);
            tracing::debug!("Leaving fullscreen");
        } else {
            self.window
                .set_fullscreen(Some(Fullscreen::Borderless(None)));
            tracing::debug!("Entering borderless fullscreen");
        }
    }

    /// Request a redraw of the window.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Create a Vulkan surface for this window.
    ///
    /// Returns a RAII [`Surface`] that destroys the surface when dropped.
    ///
    /// # Errors
    /// Returns an error if the window handles are unavailable or surface
    /// creation fails.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: The entry and instance are valid references provided by the caller.
        // The display and window handles come from a live winit window.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Surface(format!("Failed to create Vulkan surface: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}

/// Instance extensions needed to present to windows of this event loop.
///
/// The returned pointers reference static strings owned by the Vulkan loader.
pub fn required_extensions(event_loop: &ActiveEventLoop) -> Result<Vec<*const c_char>> {
    let display_handle = event_loop
        .display_handle()
        .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

    let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
        .map_err(|e| Error::Surface(format!("Failed to enumerate required extensions: {}", e)))?;

    Ok(extensions.to_vec())
}

fn half_of_display(display: Option<(u32, u32)>) -> (u32, u32) {
    match display {
        Some((w, h)) if w >= 2 && h >= 2 => (w / 2, h / 2),
        _ => FALLBACK_SIZE,
    }
}
