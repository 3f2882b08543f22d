//! Sampled textures with per-frame descriptor sets.

use std::sync::Arc;

use tracing::{trace, warn};

use tilegpu_assets::Pixels;
use tilegpu_rhi::command::CommandPool;
use tilegpu_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, write_texture};
use tilegpu_rhi::device::Device;
use tilegpu_rhi::image::Image;
use tilegpu_rhi::sampler::Sampler;
use tilegpu_rhi::vk;

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::error::RenderResult;

/// A device-local texture plus one descriptor set per frame slot.
///
/// Every set points at the same image view and the renderer's shared sampler.
/// The sets go back to the pool before the image is destroyed.
pub struct Texture {
    descriptor_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: Arc<DescriptorPool>,
    image: Image,
}

impl Texture {
    /// Uploads `pixels` and allocates the descriptor sets.
    pub fn new(
        device: &Arc<Device>,
        command_pool: &CommandPool,
        descriptor_pool: &Arc<DescriptorPool>,
        layout: &DescriptorSetLayout,
        sampler: &Sampler,
        pixels: &Pixels,
    ) -> RenderResult<Self> {
        let image = Image::texture(
            device.clone(),
            command_pool,
            pixels.width(),
            pixels.height(),
            pixels.data(),
        )?;

        let layouts = [layout.handle(); MAX_FRAMES_IN_FLIGHT];
        let descriptor_sets = descriptor_pool.allocate(&layouts)?;
        for &set in &descriptor_sets {
            write_texture(device, set, image.view(), sampler.handle());
        }

        trace!(
            "Created {}x{} texture",
            pixels.width(),
            pixels.height()
        );

        Ok(Self {
            descriptor_sets,
            descriptor_pool: descriptor_pool.clone(),
            image,
        })
    }

    /// Descriptor set to bind when recording on `slot`.
    #[inline]
    pub fn descriptor_set(&self, slot: usize) -> vk::DescriptorSet {
        self.descriptor_sets[slot]
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Err(e) = self.descriptor_pool.free(&self.descriptor_sets) {
            warn!("Failed to free texture descriptor sets: {}", e);
        }
    }
}
