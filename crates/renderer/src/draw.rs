//! Draw recording.
//!
//! [`record_scene`] decides what a frame draws; a [`DrawRecorder`] turns that
//! into commands. Objects are drawn in registry order, so an object created
//! later covers the ones before it.

use tilegpu_rhi::command::CommandBuffer;
use tilegpu_rhi::swapchain::Swapchain;
use tilegpu_rhi::vertex::INDEX_TYPE;
use tilegpu_rhi::{RhiError, vk};

use crate::error::RenderResult;

/// Clear color of every frame (opaque black).
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// GPU handles needed to draw one object.
pub trait Drawable {
    fn descriptor_set(&self, slot: usize) -> vk::DescriptorSet;
    fn vertex_buffer(&self) -> vk::Buffer;
    fn index_buffer(&self) -> vk::Buffer;
    fn index_count(&self) -> u32;
}

/// Sink for the commands of one frame.
pub trait DrawRecorder {
    fn begin_pass(&mut self, image_index: u32, extent: vk::Extent2D) -> RenderResult<()>;
    fn bind_pipeline(&mut self);
    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D);
    fn draw(
        &mut self,
        descriptor_set: vk::DescriptorSet,
        vertex_buffer: vk::Buffer,
        index_buffer: vk::Buffer,
        index_count: u32,
    );
    fn end_pass(&mut self);
}

/// Records one render pass drawing every object in order.
pub fn record_scene<'a, R, D, I>(
    recorder: &mut R,
    objects: I,
    slot: usize,
    image_index: u32,
    extent: vk::Extent2D,
) -> RenderResult<()>
where
    R: DrawRecorder,
    D: Drawable + 'a,
    I: IntoIterator<Item = &'a D>,
{
    recorder.begin_pass(image_index, extent)?;
    recorder.bind_pipeline();
    recorder.set_viewport_and_scissor(extent);

    for object in objects {
        recorder.draw(
            object.descriptor_set(slot),
            object.vertex_buffer(),
            object.index_buffer(),
            object.index_count(),
        );
    }

    recorder.end_pass();
    Ok(())
}

/// Full-extent viewport with the usual 0..1 depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Full-extent scissor.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Records into a Vulkan command buffer.
pub struct CommandRecorder<'a> {
    pub command_buffer: &'a CommandBuffer,
    pub swapchain: &'a Swapchain,
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
}

impl DrawRecorder for CommandRecorder<'_> {
    fn begin_pass(&mut self, image_index: u32, extent: vk::Extent2D) -> RenderResult<()> {
        let framebuffer = self
            .swapchain
            .framebuffer(image_index)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("no framebuffer for swapchain image {image_index}"))
            })?;
        self.command_buffer
            .begin_render_pass(self.render_pass, framebuffer, extent, CLEAR_COLOR);
        Ok(())
    }

    fn bind_pipeline(&mut self) {
        self.command_buffer.bind_graphics_pipeline(self.pipeline);
    }

    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
        self.command_buffer.set_viewport(&full_viewport(extent));
        self.command_buffer.set_scissor(&full_scissor(extent));
    }

    fn draw(
        &mut self,
        descriptor_set: vk::DescriptorSet,
        vertex_buffer: vk::Buffer,
        index_buffer: vk::Buffer,
        index_count: u32,
    ) {
        self.command_buffer
            .bind_descriptor_set(self.pipeline_layout, descriptor_set);
        self.command_buffer.bind_vertex_buffer(vertex_buffer);
        self.command_buffer.bind_index_buffer(index_buffer, INDEX_TYPE);
        self.command_buffer.draw_indexed(index_count);
    }

    fn end_pass(&mut self) {
        self.command_buffer.end_render_pass();
    }
}
