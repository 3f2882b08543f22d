//! Object creation and destruction against a real Vulkan device.
//!
//! Every test prints a skip message and returns when no Vulkan driver or
//! graphics-capable device is available.

use std::sync::Arc;

use tilegpu_assets::Pixels;
use tilegpu_renderer::object::{GpuObject, ObjectId};
use tilegpu_renderer::registry::ObjectRegistry;
use tilegpu_renderer::texture::Texture;
use tilegpu_renderer::{MAX_FRAMES_IN_FLIGHT, RenderError};
use tilegpu_rhi::command::CommandPool;
use tilegpu_rhi::descriptor::{DescriptorPool, DescriptorSetLayout};
use tilegpu_rhi::device::Device;
use tilegpu_rhi::instance::Instance;
use tilegpu_rhi::physical_device::PhysicalDeviceInfo;
use tilegpu_rhi::sampler::Sampler;
use tilegpu_rhi::vertex::{QUAD_INDICES, unit_quad};
use tilegpu_rhi::vk;

/// Objects the descriptor pool is sized for.
const POOL_OBJECTS: u32 = 2;

struct Context {
    // Field order is drop order.
    sampler: Sampler,
    descriptor_pool: Arc<DescriptorPool>,
    layout: DescriptorSetLayout,
    pool: CommandPool,
    device: Arc<Device>,
    _instance: Instance,
}

impl Context {
    fn texture(&self) -> Result<Texture, RenderError> {
        Texture::new(
            &self.device,
            &self.pool,
            &self.descriptor_pool,
            &self.layout,
            &self.sampler,
            &Pixels::solid(2, 2, [0, 128, 255, 255]),
        )
    }

    fn object(&self, raw: u64) -> Result<GpuObject, RenderError> {
        GpuObject::new(
            &self.device,
            &self.pool,
            ObjectId::new(raw),
            &unit_quad(),
            &QUAD_INDICES,
            self.texture()?,
        )
    }
}

fn context() -> Option<Context> {
    let instance = match Instance::new(c"tilegpu-renderer-tests", false, &[]) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("skipping: no Vulkan instance ({e})");
            return None;
        }
    };

    let info = unsafe { instance.handle().enumerate_physical_devices() }
        .ok()?
        .into_iter()
        .find_map(|device| {
            let families = unsafe {
                instance
                    .handle()
                    .get_physical_device_queue_family_properties(device)
            };
            let queue_family = families
                .iter()
                .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))?
                as u32;
            unsafe {
                Some(PhysicalDeviceInfo {
                    device,
                    properties: instance.handle().get_physical_device_properties(device),
                    features: instance.handle().get_physical_device_features(device),
                    memory_properties: instance
                        .handle()
                        .get_physical_device_memory_properties(device),
                    queue_family,
                })
            }
        });

    let Some(info) = info else {
        eprintln!("skipping: no graphics-capable device");
        return None;
    };

    let device = match Device::new(&instance, &info) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("skipping: device creation failed on {} ({e})", info.device_name());
            return None;
        }
    };

    let pool = CommandPool::new(device.clone()).ok()?;
    let layout = DescriptorSetLayout::texture(device.clone()).ok()?;
    let descriptor_pool = Arc::new(
        DescriptorPool::for_textures(device.clone(), MAX_FRAMES_IN_FLIGHT as u32, POOL_OBJECTS)
            .ok()?,
    );
    let sampler = Sampler::new(device.clone(), info.properties.limits.max_sampler_anisotropy).ok()?;

    Some(Context {
        sampler,
        descriptor_pool,
        layout,
        pool,
        device,
        _instance: instance,
    })
}

#[test]
fn test_texture_has_one_set_per_frame_slot() {
    let Some(ctx) = context() else { return };

    let texture = ctx.texture().unwrap();
    assert_eq!(texture.extent().width, 2);

    let sets: Vec<_> = (0..MAX_FRAMES_IN_FLIGHT)
        .map(|slot| texture.descriptor_set(slot))
        .collect();
    for (i, a) in sets.iter().enumerate() {
        assert_ne!(*a, vk::DescriptorSet::null());
        for b in &sets[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn test_destroyed_objects_return_descriptor_sets() {
    let Some(ctx) = context() else { return };
    let mut registry = ObjectRegistry::new(1);

    // Far more create/destroy cycles than the pool could hold at once
    for round in 0..(POOL_OBJECTS as u64 * 4) {
        registry.insert(ctx.object(round).unwrap()).unwrap();
        let destroyed = registry
            .destroy_after(ObjectId::new(round), || {
                ctx.device.wait_idle()?;
                Ok(())
            })
            .unwrap();
        assert!(destroyed);
    }
    assert!(registry.is_empty());
}

#[test]
fn test_object_keeps_host_geometry() {
    let Some(ctx) = context() else { return };

    let mut object = ctx.object(7).unwrap();
    assert_eq!(object.indices(), &QUAD_INDICES);

    object.translate(0.5, 0.0);
    assert_eq!(object.vertices()[0].position.x, unit_quad()[0].position.x + 0.5);
    object.upload_vertices(&ctx.pool).unwrap();
}

#[test]
fn test_invalid_geometry_creates_nothing() {
    let Some(ctx) = context() else { return };

    let result = GpuObject::new(
        &ctx.device,
        &ctx.pool,
        ObjectId::new(1),
        &unit_quad(),
        &[0, 1, 9],
        ctx.texture().unwrap(),
    );
    assert!(matches!(result, Err(RenderError::InvalidGeometry { .. })));

    // The texture's sets went back to the pool; the pool is still usable
    for raw in 0..POOL_OBJECTS as u64 {
        drop(ctx.object(raw).unwrap());
    }
}
