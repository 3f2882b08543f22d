//! Descriptor layout and pool for per-object textures.
//!
//! - [`DescriptorSetLayout`] has a single combined image-sampler binding
//!   visible to the fragment stage
//! - [`DescriptorPool`] hands out sets and takes them back individually
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tilegpu_rhi::descriptor::{DescriptorPool, DescriptorSetLayout};
//! use tilegpu_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> Result<(), tilegpu_rhi::RhiError> {
//! let layout = DescriptorSetLayout::texture(device.clone())?;
//! // Two frame slots, up to 256 textured objects
//! let pool = DescriptorPool::for_textures(device, 2, 256)?;
//! let sets = pool.allocate(&[layout.handle(); 2])?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Binding index of the texture sampler.
pub const TEXTURE_BINDING: u32 = 0;

/// Combined image-sampler binding for the fragment shader.
pub fn texture_binding() -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(TEXTURE_BINDING)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::FRAGMENT)
}

/// Pool capacity for `frames` slots times `max_objects` textures.
///
/// Returns `None` on overflow.
pub fn texture_pool_capacity(frames: u32, max_objects: u32) -> Option<u32> {
    frames.checked_mul(max_objects)
}

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates the layout used by every textured object.
    pub fn texture(device: Arc<Device>) -> RhiResult<Self> {
        let bindings = [texture_binding()];
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        // SAFETY: The binding array outlives the call.
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)
                .map_err(|e| {
                    RhiError::PipelineError(format!("Failed to create descriptor set layout: {:?}", e))
                })?
        };

        debug!("Created texture descriptor set layout");

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        // SAFETY: Pipelines and pools referencing the layout are already gone.
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Descriptor pool that allows freeing individual sets.
///
/// Not synchronized; only the thread driving the renderer touches it.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Creates a pool for `frames × max_objects` combined image samplers.
    pub fn for_textures(device: Arc<Device>, frames: u32, max_objects: u32) -> RhiResult<Self> {
        let capacity = texture_pool_capacity(frames, max_objects)
            .filter(|&c| c > 0)
            .ok_or_else(|| {
                RhiError::PipelineError(format!(
                    "Invalid descriptor pool size: {} frames x {} objects",
                    frames, max_objects
                ))
            })?;

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(capacity)];

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(capacity)
            .pool_sizes(&pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        // SAFETY: pool_sizes outlives the call.
        let pool = unsafe {
            device
                .handle()
                .create_descriptor_pool(&create_info, None)
                .map_err(|e| {
                    RhiError::PipelineError(format!("Failed to create descriptor pool: {:?}", e))
                })?
        };

        debug!("Created descriptor pool: max_sets={}", capacity);

        Ok(Self { device, pool })
    }

    /// Allocates one set per entry in `layouts`.
    ///
    /// # Errors
    ///
    /// Fails when the pool is exhausted.
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        // SAFETY: The layouts are alive.
        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        trace!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }

    /// Returns sets to the pool.
    ///
    /// The caller must ensure no pending command buffer references them.
    pub fn free(&self, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        if sets.is_empty() {
            return Ok(());
        }

        // SAFETY: The pool was created with FREE_DESCRIPTOR_SET.
        unsafe {
            self.device.handle().free_descriptor_sets(self.pool, sets)?;
        }

        trace!("Freed {} descriptor set(s)", sets.len());

        Ok(())
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        // SAFETY: Destroying the pool frees every set still allocated from it.
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Points `set` at `view` sampled through `sampler`.
pub fn write_texture(device: &Device, set: vk::DescriptorSet, view: vk::ImageView, sampler: vk::Sampler) {
    let image_infos = [vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(view)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];

    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(TEXTURE_BINDING)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(&image_infos);

    // SAFETY: The set is not referenced by any pending command buffer yet.
    unsafe {
        device.handle().update_descriptor_sets(&[write], &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_binding() {
        let binding = texture_binding();
        assert_eq!(binding.binding, 0);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_texture_pool_capacity() {
        assert_eq!(texture_pool_capacity(2, 1024), Some(2048));
        assert_eq!(texture_pool_capacity(2, 0), Some(0));
        assert_eq!(texture_pool_capacity(u32::MAX, 2), None);
    }
}
