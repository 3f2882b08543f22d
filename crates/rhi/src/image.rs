//! Sampled 2D images with allocator-managed memory.
//!
//! [`Image`] owns the image, its view and its allocation. Pixel data arrives
//! through [`Image::upload`], which stages the bytes and brackets the copy
//! with two layout transitions:
//!
//! | old layout             | new layout               | src access     | dst access  |
//! |------------------------|--------------------------|----------------|-------------|
//! | `UNDEFINED`            | `TRANSFER_DST_OPTIMAL`   | none           | transfer write |
//! | `TRANSFER_DST_OPTIMAL` | `SHADER_READ_ONLY_OPTIMAL` | transfer write | shader read |

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, trace};

use crate::buffer::{Buffer, BufferUsage, find_memory_type, verify_memory_flags};
use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::swapchain::color_subresource_range;

/// Format every texture is stored in. Matches the BGRA pixel layout the
/// asset loader produces.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;

/// Access masks and stages for one supported layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage the barrier waits on
    pub src_stage: vk::PipelineStageFlags,
    /// Stage blocked by the barrier
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier parameters for `old` → `new`.
///
/// # Errors
///
/// Only the two transitions of the upload path are supported; anything else
/// returns [`RhiError::InvalidHandle`].
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> RhiResult<TransitionMasks> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        _ => Err(RhiError::InvalidHandle(format!(
            "Unsupported layout transition {:?} -> {:?}",
            old, new
        ))),
    }
}

/// Bytes per texel for the formats textures may use.
pub fn bytes_per_pixel(format: vk::Format) -> Option<u32> {
    match format {
        vk::Format::B8G8R8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::R8G8B8A8_UNORM => Some(4),
        _ => None,
    }
}

/// GPU image with a color view.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    extent: vk::Extent2D,
    format: vk::Format,
}

impl Image {
    /// Creates a device-local, optimally tiled 2D image and its view.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero-sized extent, an unsupported format, or
    /// any Vulkan/allocator failure. Nothing is leaked on failure.
    pub fn new(
        device: Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> RhiResult<Self> {
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image extent must be non-zero, got {}x{}",
                width, height
            )));
        }
        if bytes_per_pixel(format).is_none() {
            return Err(RhiError::InvalidHandle(format!(
                "Unsupported texture format {:?}",
                format
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        // SAFETY: The device is alive and image_info is valid.
        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let mut this = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: None,
            extent: vk::Extent2D { width, height },
            format,
        };

        // SAFETY: The image was just created on this device.
        let requirements = unsafe { this.device.handle().get_image_memory_requirements(image) };
        find_memory_type(
            this.device.memory_properties(),
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let allocation = this.device.lock_allocator()?.allocate(&AllocationCreateDesc {
            name: "texture",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        // SAFETY: The memory handle is only used to bind this allocation.
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        let actual = allocation.memory_properties();
        this.allocation = Some(allocation);
        verify_memory_flags(
            actual,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        // SAFETY: The allocation satisfies the image's requirements.
        unsafe {
            this.device.handle().bind_image_memory(image, memory, offset)?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(color_subresource_range());

        // SAFETY: The image has memory bound.
        this.view = unsafe { this.device.handle().create_image_view(&view_info, None)? };

        trace!("Created {}x{} {:?} image", width, height, format);

        Ok(this)
    }

    /// Creates a sampled texture image and fills it with `pixels`.
    pub fn texture(device: Arc<Device>, pool: &CommandPool, width: u32, height: u32, pixels: &[u8]) -> RhiResult<Self> {
        let image = Self::new(
            device,
            width,
            height,
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;
        image.upload(pool, pixels)?;
        Ok(image)
    }

    /// Uploads tightly packed pixels covering the whole image.
    ///
    /// Leaves the image in `SHADER_READ_ONLY_OPTIMAL`. Blocks until the GPU
    /// has finished the copy.
    pub fn upload(&self, pool: &CommandPool, pixels: &[u8]) -> RhiResult<()> {
        let expected = self.byte_size();
        if pixels.len() as vk::DeviceSize != expected {
            return Err(RhiError::InvalidHandle(format!(
                "Expected {} bytes of pixel data for {}x{}, got {}",
                expected,
                self.extent.width,
                self.extent.height,
                pixels.len()
            )));
        }

        let staging = Buffer::new(self.device.clone(), BufferUsage::Staging, expected)?;
        staging.write_mapped(pixels)?;

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            });

        pool.one_shot(|cmd| {
            self.record_transition(
                cmd,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            cmd.copy_buffer_to_image(
                staging.handle(),
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
            self.record_transition(
                cmd,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })?;

        debug!(
            "Uploaded {}x{} texture ({} bytes)",
            self.extent.width, self.extent.height, expected
        );
        Ok(())
    }

    fn record_transition(
        &self,
        cmd: &crate::command::CommandBuffer,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> RhiResult<()> {
        let masks = transition_masks(old, new)?;
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(color_subresource_range())
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        cmd.pipeline_barrier(masks.src_stage, masks.dst_stage, &[barrier]);
        Ok(())
    }

    /// Size in bytes of tightly packed pixel data for this image.
    pub fn byte_size(&self) -> vk::DeviceSize {
        let bpp = bytes_per_pixel(self.format).unwrap_or(4);
        self.extent.width as vk::DeviceSize * self.extent.height as vk::DeviceSize * bpp as vk::DeviceSize
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the image view.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the image extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        // SAFETY: Owners drop images only after the GPU is done with them.
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        tracing::error!("Failed to free image allocation: {:?}", e);
                    }
                }
                Err(e) => tracing::error!("Leaking image allocation: {}", e),
            }
        }

        trace!(
            "Destroyed {}x{} image",
            self.extent.width, self.extent.height
        );
    }
}
