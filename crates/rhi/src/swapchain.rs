//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, presentation
//! and full teardown-and-rebuild when the surface goes stale.
//!
//! # Overview
//!
//! The [`Swapchain`] owns the whole presentable chain:
//! - Swapchain images (owned by the driver, tracked here)
//! - One image view per image
//! - One framebuffer per image, once a render pass has been attached
//!
//! After any successful [`Swapchain::new`] + [`Swapchain::create_framebuffers`]
//! or [`Swapchain::recreate`], the three lists have the same length.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tilegpu_rhi::device::Device;
//! use tilegpu_rhi::instance::Instance;
//! use tilegpu_rhi::swapchain::Swapchain;
//! use tilegpu_rhi::vk;
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR, render_pass: vk::RenderPass)
//! #     -> Result<(), tilegpu_rhi::RhiError> {
//! let mut swapchain = Swapchain::new(instance, device, surface, (1280, 720))?;
//! swapchain.create_framebuffers(render_pass)?;
//!
//! // On resize or a stale acquire:
//! swapchain.recreate((1920, 1080))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::sync::INFINITE_TIMEOUT;

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats, in the order the platform reports them
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes, in the order the platform reports them
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        // SAFETY: The physical device and surface belong to the same instance.
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// Handles and settings of one built chain, before framebuffers.
struct Chain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

/// Vulkan swapchain wrapper.
///
/// # Thread Safety
///
/// The swapchain is not thread-safe. Only the thread driving the frame loop
/// should interact with it.
pub struct Swapchain {
    device: Arc<Device>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    /// Render pass the framebuffers are built against, null until attached
    render_pass: vk::RenderPass,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates a new swapchain for `surface`.
    ///
    /// `drawable_size` is the window's framebuffer size in pixels. It is only
    /// consulted when the platform leaves the surface extent undefined.
    ///
    /// # Errors
    ///
    /// Returns an error if surface queries fail, the surface reports no
    /// format or present mode, or swapchain/view creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        drawable_size: (u32, u32),
    ) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let chain = build_chain(
            &device,
            &surface_loader,
            &swapchain_loader,
            surface,
            drawable_size,
        )?;

        Ok(Self {
            device,
            surface_loader,
            swapchain_loader,
            surface,
            swapchain: chain.swapchain,
            images: chain.images,
            image_views: chain.image_views,
            framebuffers: Vec::new(),
            render_pass: vk::RenderPass::null(),
            surface_format: chain.surface_format,
            extent: chain.extent,
        })
    }

    /// Builds one framebuffer per image view against `render_pass`.
    ///
    /// The render pass is remembered so [`recreate`](Self::recreate) can
    /// rebuild the framebuffers.
    pub fn create_framebuffers(&mut self, render_pass: vk::RenderPass) -> RhiResult<()> {
        self.destroy_framebuffers();
        self.render_pass = render_pass;

        for (i, &view) in self.image_views.iter().enumerate() {
            let attachments = [view];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            // SAFETY: The view and render pass are alive and format-compatible.
            let framebuffer = unsafe {
                self.device
                    .handle()
                    .create_framebuffer(&create_info, None)
                    .map_err(|e| {
                        RhiError::SwapchainError(format!(
                            "Failed to create framebuffer {}: {:?}",
                            i, e
                        ))
                    })?
            };
            self.framebuffers.push(framebuffer);
        }

        debug!("Created {} framebuffers", self.framebuffers.len());
        Ok(())
    }

    /// Tears the whole chain down and builds a fresh one.
    ///
    /// Drains the device first. Framebuffers, views and the swapchain handle
    /// are destroyed in that order before anything new is created. If a
    /// render pass was attached, framebuffers are rebuilt against it.
    pub fn recreate(&mut self, drawable_size: (u32, u32)) -> RhiResult<()> {
        self.device.wait_idle()?;

        info!(
            "Recreating swapchain for drawable size: {}x{}",
            drawable_size.0, drawable_size.1
        );

        self.destroy_chain();

        let chain = build_chain(
            &self.device,
            &self.surface_loader,
            &self.swapchain_loader,
            self.surface,
            drawable_size,
        )?;

        self.swapchain = chain.swapchain;
        self.images = chain.images;
        self.image_views = chain.image_views;
        self.surface_format = chain.surface_format;
        self.extent = chain.extent;

        if self.render_pass != vk::RenderPass::null() {
            self.create_framebuffers(self.render_pass)?;
        }

        Ok(())
    }

    /// Acquires the next swapchain image, waiting without a timeout.
    ///
    /// Returns `(image_index, suboptimal)`. An out-of-date surface comes back
    /// as `Err(vk::Result::ERROR_OUT_OF_DATE_KHR)`.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        if self.swapchain == vk::SwapchainKHR::null() {
            return Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        }

        // SAFETY: The swapchain is alive and the semaphore is unsignaled.
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                INFINITE_TIMEOUT,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Presents `image_index` once `wait_semaphore` is signaled.
    ///
    /// Returns true if the swapchain is suboptimal and should be recreated.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: The image index came from acquire_next_image on this swapchain.
        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    /// Returns the presentation extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns all image views.
    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Returns the framebuffer for `image_index`, if one exists.
    #[inline]
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    /// Returns all framebuffers.
    #[inline]
    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            // SAFETY: Callers drain the device before tearing the chain down.
            unsafe {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
    }

    fn destroy_chain(&mut self) {
        self.destroy_framebuffers();

        for view in self.image_views.drain(..) {
            // SAFETY: No framebuffer references the view anymore.
            unsafe {
                self.device.handle().destroy_image_view(view, None);
            }
        }

        if self.swapchain != vk::SwapchainKHR::null() {
            // SAFETY: Images are owned by the swapchain and go with it.
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            self.swapchain = vk::SwapchainKHR::null();
        }

        self.images.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        let image_count = self.images.len();
        self.destroy_chain();

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width, self.extent.height, image_count
        );
    }
}

fn build_chain(
    device: &Device,
    surface_loader: &ash::khr::surface::Instance,
    swapchain_loader: &ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    drawable_size: (u32, u32),
) -> RhiResult<Chain> {
    let support = SwapchainSupportDetails::query(device.physical_device(), surface, surface_loader)?;

    let (Some(surface_format), Some(present_mode)) = (
        choose_surface_format(&support.formats),
        choose_present_mode(&support.present_modes),
    ) else {
        return Err(RhiError::SwapchainError(
            "Inadequate swapchain support (no formats or present modes)".to_string(),
        ));
    };
    let extent = choose_extent(&support.capabilities, drawable_size.0, drawable_size.1);
    let image_count = determine_image_count(&support.capabilities);

    info!(
        "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
        extent.width,
        extent.height,
        surface_format.format,
        surface_format.color_space,
        present_mode,
        image_count
    );

    // Graphics and presentation share one queue family.
    let (sharing_mode, queue_family_indices) =
        sharing_for(device.queue_family(), device.queue_family());

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(&queue_family_indices)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(vk::SwapchainKHR::null());

    // SAFETY: The surface is alive and supported by the device's queue family.
    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

    // SAFETY: The swapchain was just created.
    let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(e.into());
        }
    };

    let image_views = match create_image_views(device, &images, surface_format.format) {
        Ok(views) => views,
        Err(e) => {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(e);
        }
    };

    info!("Swapchain created with {} images", images.len());

    Ok(Chain {
        swapchain,
        images,
        image_views,
        surface_format,
        extent,
    })
}

/// Chooses the surface format.
///
/// Prefers B8G8R8A8_SRGB with SRGB_NONLINEAR. Otherwise the first reported
/// pair is used and colors may not match what the assets were authored for.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(&format) = preferred {
        debug!("Selected preferred surface format: B8G8R8A8_SRGB with SRGB_NONLINEAR");
        return Some(format);
    }

    let first = formats.first().copied()?;
    warn!(
        "Preferred sRGB surface format unavailable, using {:?} / {:?}; colors may be off",
        first.format, first.color_space
    );
    Some(first)
}

/// Chooses the present mode: MAILBOX if supported, else the first reported.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> Option<vk::PresentModeKHR> {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        debug!("Selected MAILBOX present mode");
        return Some(vk::PresentModeKHR::MAILBOX);
    }

    let first = present_modes.first().copied()?;
    debug!("MAILBOX unsupported, using {:?}", first);
    Some(first)
}

/// Chooses the swapchain extent.
///
/// The current extent is used verbatim unless its width is the `u32::MAX`
/// sentinel, in which case the drawable size is clamped per axis into the
/// surface's limits.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    let extent = vk::Extent2D {
        width: width.max(min.width).min(max.width),
        height: height.max(min.height).min(max.height),
    };

    debug!(
        "Calculated extent: {}x{} (drawable: {}x{}, min: {}x{}, max: {}x{})",
        extent.width, extent.height, width, height, min.width, min.height, max.width, max.height
    );

    extent
}

/// Minimum image count plus two, clamped to the maximum when one is set.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 2;

    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Image sharing for a graphics and a present queue family.
///
/// Distinct families get CONCURRENT sharing across both. The renderer always
/// passes the same family twice.
pub fn sharing_for(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family != present_family {
        (
            vk::SharingMode::CONCURRENT,
            vec![graphics_family, present_family],
        )
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

/// Creates image views for swapchain images.
///
/// On failure, views created so far are destroyed.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(color_subresource_range());

        // SAFETY: The image belongs to a live swapchain.
        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    debug!("Created {} image views", image_views.len());
    Ok(image_views)
}

/// Single-mip, single-layer color range.
pub(crate) fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = vec![
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let formats = vec![
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_surface_format_srgb_needs_matching_color_space() {
        let formats = vec![
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn test_choose_surface_format_empty() {
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_choose_present_mode_prefers_mailbox() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];

        assert_eq!(choose_present_mode(&modes), Some(vk::PresentModeKHR::MAILBOX));
    }

    #[test]
    fn test_choose_present_mode_falls_back_to_first_reported() {
        let modes = vec![vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];

        assert_eq!(choose_present_mode(&modes), Some(vk::PresentModeKHR::IMMEDIATE));
        assert_eq!(choose_present_mode(&[]), None);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn test_choose_extent_clamps_drawable_size() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 50);
        assert_eq!(extent.width, 2000);
        assert_eq!(extent.height, 100);

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn test_determine_image_count() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 4);

        // 0 means no limit
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 5);
    }

    #[test]
    fn test_determine_image_count_never_below_minimum() {
        for min in 1..6 {
            for max in [0, min, min + 1, min + 5] {
                let capabilities = vk::SurfaceCapabilitiesKHR {
                    min_image_count: min,
                    max_image_count: max,
                    ..Default::default()
                };
                let count = determine_image_count(&capabilities);
                assert!(count >= min);
                if max > 0 {
                    assert!(count <= max);
                }
            }
        }
    }

    #[test]
    fn test_sharing_for_same_family() {
        let (mode, families) = sharing_for(0, 0);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(families.is_empty());
    }

    #[test]
    fn test_sharing_for_distinct_families() {
        let (mode, families) = sharing_for(0, 2);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(families, vec![0, 2]);
    }
}
