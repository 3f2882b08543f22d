//! Renderer orchestration.
//!
//! [`Renderer`] owns every Vulkan object of the engine and exposes the
//! object operations (create, destroy, move, re-upload, load a level) and the
//! per-frame entry point.

use std::ffi::{CStr, c_char};
use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use tilegpu_assets::{Level, load_image, read_binary};
use tilegpu_core::{EngineConfig, FrameTimer};
use tilegpu_platform::{Surface, Window};
use tilegpu_rhi::RhiError;
use tilegpu_rhi::command::CommandPool;
use tilegpu_rhi::descriptor::{DescriptorPool, DescriptorSetLayout};
use tilegpu_rhi::device::Device;
use tilegpu_rhi::instance::Instance;
use tilegpu_rhi::physical_device::{PhysicalDeviceInfo, select_device};
use tilegpu_rhi::pipeline::{
    ColorBlendAttachment, CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use tilegpu_rhi::render_pass::RenderPass;
use tilegpu_rhi::sampler::Sampler;
use tilegpu_rhi::shader::{Shader, ShaderStage};
use tilegpu_rhi::swapchain::Swapchain;
use tilegpu_rhi::sync::INFINITE_TIMEOUT;
use tilegpu_rhi::vertex::{Index, QUAD_INDICES, SpriteVertex};
use tilegpu_rhi::vk;

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::draw::{CommandRecorder, record_scene};
use crate::error::{RenderError, RenderResult};
use crate::frame::FrameSlots;
use crate::frame_manager::{
    AcquireOutcome, FrameBackend, FrameDriver, FrameOutcome, PresentOutcome, classify_acquire,
    classify_present,
};
use crate::level::{spawn_tiles, tile_vertices};
use crate::object::{GpuObject, ObjectId, TextureSource, validate_geometry};
use crate::registry::{Keyed, ObjectRegistry};
use crate::texture::Texture;

const APP_NAME: &CStr = c"tilegpu";

/// Owner of all GPU state.
///
/// # Resource Destruction Order
///
/// 1. Wait for the device to go idle
/// 2. Objects (vertex buffer, index buffer, texture of each)
/// 3. Frame slots, then the command pool they came from
/// 4. Pipeline, pipeline layout, sampler
/// 5. Descriptor pool, descriptor set layout
/// 6. Swapchain (framebuffers, views, swapchain), then the render pass
/// 7. Device
/// 8. Surface
/// 9. Instance
///
/// ManuallyDrop is used to enforce this order.
pub struct Renderer {
    objects: ObjectRegistry<GpuObject>,
    frame_slots: ManuallyDrop<FrameSlots>,
    command_pool: ManuallyDrop<CommandPool>,

    pipeline: ManuallyDrop<Pipeline>,
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    /// Shared by every texture.
    sampler: ManuallyDrop<Sampler>,
    descriptor_pool: ManuallyDrop<Arc<DescriptorPool>>,
    descriptor_set_layout: ManuallyDrop<DescriptorSetLayout>,

    swapchain: ManuallyDrop<Swapchain>,
    render_pass: ManuallyDrop<RenderPass>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,

    driver: FrameDriver,
    timer: FrameTimer,
    /// Set on resize; the swapchain is rebuilt before the next frame.
    swapchain_stale: bool,
    max_objects: u32,
}

impl Renderer {
    /// Brings up Vulkan for `window`.
    ///
    /// `surface_extensions` are the instance extensions the window system
    /// needs (see `tilegpu_platform::required_extensions`).
    ///
    /// # Errors
    ///
    /// Returns an error if no device can drive the window's surface, a shader
    /// blob is missing or invalid, or any Vulkan object fails to create.
    pub fn new(
        window: &Window,
        surface_extensions: &[*const c_char],
        config: &EngineConfig,
        enable_validation: bool,
    ) -> RenderResult<Self> {
        let drawable_size = window.drawable_size();
        info!(
            "Initializing renderer ({}x{})",
            drawable_size.0, drawable_size.1
        );

        let instance = Instance::new(APP_NAME, enable_validation, surface_extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let (device, mut swapchain, device_info) =
            open_device(&instance, &surface, drawable_size)?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format())?;
        swapchain.create_framebuffers(render_pass.handle())?;

        let descriptor_set_layout = DescriptorSetLayout::texture(device.clone())?;
        let descriptor_pool = Arc::new(DescriptorPool::for_textures(
            device.clone(),
            MAX_FRAMES_IN_FLIGHT as u32,
            config.max_objects,
        )?);
        let sampler = Sampler::new(
            device.clone(),
            device_info.properties.limits.max_sampler_anisotropy,
        )?;

        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()])?;
        let pipeline = create_sprite_pipeline(
            &device,
            config,
            render_pass.handle(),
            &pipeline_layout,
        )?;

        let command_pool = CommandPool::new(device.clone())?;
        let frame_slots = FrameSlots::new(&device, &command_pool)?;

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight",
            swapchain.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            objects: ObjectRegistry::new(config.initial_object_capacity),
            frame_slots: ManuallyDrop::new(frame_slots),
            command_pool: ManuallyDrop::new(command_pool),
            pipeline: ManuallyDrop::new(pipeline),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            sampler: ManuallyDrop::new(sampler),
            descriptor_pool: ManuallyDrop::new(descriptor_pool),
            descriptor_set_layout: ManuallyDrop::new(descriptor_set_layout),
            swapchain: ManuallyDrop::new(swapchain),
            render_pass: ManuallyDrop::new(render_pass),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            driver: FrameDriver::new(config.max_consecutive_frame_failures),
            timer: FrameTimer::new(),
            swapchain_stale: false,
            max_objects: config.max_objects,
        })
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Creates a textured object drawn on top of everything created before.
    ///
    /// # Errors
    ///
    /// Fails with [`RenderError::DuplicateObject`] if `id` is live,
    /// [`RenderError::InvalidGeometry`] for empty or out-of-range indices,
    /// [`RenderError::TooManyObjects`] when the descriptor pool is full, or
    /// with the underlying error if decoding or any GPU allocation fails. No
    /// resource of the failed object is left behind.
    pub fn create_object(
        &mut self,
        id: ObjectId,
        vertices: &[SpriteVertex],
        indices: &[Index],
        texture: TextureSource,
    ) -> RenderResult<()> {
        if self.objects.find(id).is_some() {
            return Err(RenderError::DuplicateObject(id));
        }
        validate_geometry(vertices, indices)
            .map_err(|message| RenderError::InvalidGeometry { id, message })?;
        if self.objects.len() >= self.max_objects as usize {
            return Err(RenderError::TooManyObjects {
                max: self.max_objects,
            });
        }

        let pixels = match texture {
            TextureSource::Path(path) => load_image(&path)?,
            TextureSource::Pixels(pixels) => pixels,
        };

        let texture = Texture::new(
            &self.device,
            &self.command_pool,
            &self.descriptor_pool,
            &self.descriptor_set_layout,
            &self.sampler,
            &pixels,
        )?;
        let object = GpuObject::new(
            &self.device,
            &self.command_pool,
            id,
            vertices,
            indices,
            texture,
        )?;

        self.objects.insert(object)?;
        debug!("Object {} created ({} live)", id, self.objects.len());
        Ok(())
    }

    /// Destroys the object with `id` once the GPU is idle.
    ///
    /// Returns `false` if no such object exists.
    pub fn destroy_object(&mut self, id: ObjectId) -> RenderResult<bool> {
        let device: &Device = &self.device;
        let destroyed = self
            .objects
            .destroy_after(id, || device.wait_idle().map_err(RenderError::from))?;
        if destroyed {
            debug!("Object {} destroyed ({} live)", id, self.objects.len());
        }
        Ok(destroyed)
    }

    /// Moves an object's host vertices by (`dx`, `dy`) in normalized device
    /// coordinates. Call [`update_object_vertices`](Self::update_object_vertices)
    /// to make the move visible.
    ///
    /// Returns `false` if no such object exists.
    pub fn transform_object(&mut self, id: ObjectId, dx: f32, dy: f32) -> bool {
        match self.objects.find_mut(id) {
            Some(object) => {
                object.translate(dx, dy);
                true
            }
            None => false,
        }
    }

    /// Re-uploads an object's host vertices to its vertex buffer.
    ///
    /// Waits for the device to go idle first so no pending frame reads the
    /// buffer mid-copy. Returns `false` if no such object exists.
    pub fn update_object_vertices(&mut self, id: ObjectId) -> RenderResult<bool> {
        let Some(object) = self.objects.find(id) else {
            return Ok(false);
        };
        self.device.wait_idle()?;
        object.upload_vertices(&self.command_pool)?;
        trace!("Object {} vertices re-uploaded", id);
        Ok(true)
    }

    /// Destroys every object.
    pub fn destroy_all_objects(&mut self) -> RenderResult<()> {
        if self.objects.is_empty() {
            return Ok(());
        }
        self.device.wait_idle()?;
        let count = self.objects.len();
        self.objects.clear();
        debug!("Destroyed all {} objects", count);
        Ok(())
    }

    /// Loads a tile-map level, one object per occupied cell.
    ///
    /// Tiles of a previously loaded level are destroyed first. Returns the
    /// number of tiles created.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::TileFailed`] naming the cell whose object could
    /// not be created; the tiles created before it are destroyed again.
    pub fn load_level(&mut self, path: impl AsRef<Path>) -> RenderResult<usize> {
        let path = path.as_ref();
        let level = Level::load(path)?;

        self.unload_level()?;

        let ids = spawn_tiles(
            self,
            &level.cells,
            |renderer, cell| {
                let id = ObjectId::tile(cell.column, cell.row);
                renderer.create_object(
                    id,
                    &tile_vertices(&level, cell),
                    &QUAD_INDICES,
                    TextureSource::Pixels(cell.pixels.clone()),
                )?;
                Ok(id)
            },
            |renderer, id| {
                if let Err(e) = renderer.destroy_object(id) {
                    warn!("Failed to roll back tile {}: {}", id, e);
                }
            },
        )?;

        info!("Level {} loaded ({} tiles)", path.display(), ids.len());
        Ok(ids.len())
    }

    /// Destroys every tile object.
    fn unload_level(&mut self) -> RenderResult<()> {
        let tiles: Vec<ObjectId> = self
            .objects
            .iter()
            .map(Keyed::id)
            .filter(|id| id.is_tile())
            .collect();
        if tiles.is_empty() {
            return Ok(());
        }

        self.device.wait_idle()?;
        for id in &tiles {
            self.objects.remove(*id);
        }
        debug!("Unloaded {} tiles", tiles.len());
        Ok(())
    }

    pub fn find_object(&self, id: ObjectId) -> Option<&GpuObject> {
        self.objects.find(id)
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// Requests swapchain recreation before the next frame.
    pub fn mark_swapchain_stale(&mut self) {
        self.swapchain_stale = true;
    }

    /// Current swapchain extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Draws and presents one frame.
    ///
    /// A zero-area `drawable_size` (minimized window) skips the frame without
    /// touching the swapchain.
    ///
    /// # Errors
    ///
    /// Returns an error for failures that cannot be ridden out: device loss
    /// while waiting, swapchain recreation failure, or too many failed frames
    /// in a row.
    pub fn render_frame(&mut self, drawable_size: (u32, u32)) -> RenderResult<FrameOutcome> {
        if drawable_size.0 == 0 || drawable_size.1 == 0 {
            self.timer.reset();
            return Ok(FrameOutcome::Skipped);
        }

        if self.swapchain_stale {
            self.swapchain.recreate(drawable_size)?;
            self.swapchain_stale = false;
        }

        let mut backend = VulkanFrame {
            device: &self.device,
            swapchain: &mut self.swapchain,
            slots: &mut self.frame_slots,
            objects: &self.objects,
            render_pass: self.render_pass.handle(),
            pipeline: self.pipeline.handle(),
            pipeline_layout: self.pipeline_layout.handle(),
            drawable_size,
        };
        let outcome = self.driver.render(&mut backend)?;

        if outcome == FrameOutcome::Presented {
            self.timer.tick();
        }
        Ok(outcome)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to wait for device idle during renderer drop: {}", e);
        }

        self.objects.clear();

        // SAFETY: Each field is dropped exactly once, here, and never used
        // afterwards. The order follows the struct documentation.
        unsafe {
            ManuallyDrop::drop(&mut self.frame_slots);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.sampler);
            ManuallyDrop::drop(&mut self.descriptor_pool);
            ManuallyDrop::drop(&mut self.descriptor_set_layout);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}

/// Walks the candidate devices until one yields both a logical device and a
/// swapchain for `surface`.
fn open_device(
    instance: &Instance,
    surface: &Surface,
    drawable_size: (u32, u32),
) -> RenderResult<(Arc<Device>, Swapchain, PhysicalDeviceInfo)> {
    let candidates = select_device(instance.handle(), surface.handle(), surface.loader())?;

    for candidate in candidates {
        let device = match Device::new(instance, &candidate) {
            Ok(device) => device,
            Err(e) => {
                warn!(
                    "Device creation failed on '{}': {}",
                    candidate.device_name(),
                    e
                );
                continue;
            }
        };

        match Swapchain::new(instance, device.clone(), surface.handle(), drawable_size) {
            Ok(swapchain) => {
                info!("Using GPU '{}'", candidate.device_name());
                return Ok((device, swapchain, candidate));
            }
            Err(e) => warn!(
                "Swapchain creation failed on '{}': {}",
                candidate.device_name(),
                e
            ),
        }
    }

    Err(RhiError::NoSuitableGpu.into())
}

fn create_sprite_pipeline(
    device: &Arc<Device>,
    config: &EngineConfig,
    render_pass: vk::RenderPass,
    layout: &PipelineLayout,
) -> RenderResult<Pipeline> {
    let vertex_code = read_binary(&config.vertex_shader)?;
    let fragment_code = read_binary(&config.fragment_shader)?;

    let vertex_shader = Shader::from_spirv_bytes(device.clone(), &vertex_code, ShaderStage::Vertex)?;
    let fragment_shader =
        Shader::from_spirv_bytes(device.clone(), &fragment_code, ShaderStage::Fragment)?;

    let pipeline = GraphicsPipelineBuilder::new()
        .vertex_shader(&vertex_shader)
        .fragment_shader(&fragment_shader)
        .vertex_binding(SpriteVertex::binding_description())
        .vertex_attributes(&SpriteVertex::attribute_descriptions())
        .cull_mode(CullMode::Back)
        .front_face(FrontFace::Clockwise)
        .color_blend_attachment(ColorBlendAttachment::alpha_blend())
        .render_pass(render_pass)
        .build(device.clone(), layout)?;

    Ok(pipeline)
}

/// The Vulkan side of one frame, borrowed from the renderer.
struct VulkanFrame<'a> {
    device: &'a Arc<Device>,
    swapchain: &'a mut Swapchain,
    slots: &'a mut FrameSlots,
    objects: &'a ObjectRegistry<GpuObject>,
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    drawable_size: (u32, u32),
}

impl FrameBackend for VulkanFrame<'_> {
    fn wait_slot(&mut self, slot: usize) -> RenderResult<()> {
        self.slots.get(slot).in_flight().wait(INFINITE_TIMEOUT)?;
        Ok(())
    }

    fn acquire(&mut self, slot: usize) -> AcquireOutcome {
        let semaphore = self.slots.get(slot).image_available().handle();
        classify_acquire(self.swapchain.acquire_next_image(semaphore))
    }

    fn reset_slot(&mut self, slot: usize) -> RenderResult<()> {
        let frame = self.slots.get(slot);
        frame.in_flight().reset()?;
        frame.command_buffer().reset()?;
        Ok(())
    }

    fn record(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
        let command_buffer = self.slots.get(slot).command_buffer();
        command_buffer.begin()?;

        let mut recorder = CommandRecorder {
            command_buffer,
            swapchain: &*self.swapchain,
            render_pass: self.render_pass,
            pipeline: self.pipeline,
            pipeline_layout: self.pipeline_layout,
        };
        record_scene(
            &mut recorder,
            self.objects.iter(),
            slot,
            image_index,
            self.swapchain.extent(),
        )?;

        command_buffer.end()?;
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> RenderResult<()> {
        let frame = self.slots.get(slot);
        let wait_semaphores = [frame.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer().handle()];
        let signal_semaphores = [frame.render_finished().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: The command buffer finished recording and every handle in
        // submit_info belongs to this device.
        unsafe {
            self.device
                .submit(&[submit_info], frame.in_flight().handle())?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> PresentOutcome {
        let semaphore = self.slots.get(slot).render_finished().handle();
        classify_present(
            self.swapchain
                .present(self.device.queue(), image_index, semaphore),
        )
    }

    fn recreate_swapchain(&mut self) -> RenderResult<()> {
        self.swapchain.recreate(self.drawable_size)?;
        Ok(())
    }

    fn recover_slot(&mut self, slot: usize) -> RenderResult<()> {
        self.device.wait_idle()?;
        self.slots.get_mut(slot).recover(self.device)?;
        Ok(())
    }
}
