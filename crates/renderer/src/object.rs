//! Renderable objects.
//!
//! A [`GpuObject`] is one textured quad: host copies of its vertices and
//! indices, the matching GPU buffers, and a [`Texture`]. Field order is drop
//! order, so the vertex buffer goes first, then the index buffer, then the
//! texture.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use glam::Vec2;
use tracing::trace;

use tilegpu_assets::Pixels;
use tilegpu_rhi::buffer::{Buffer, BufferUsage};
use tilegpu_rhi::command::CommandPool;
use tilegpu_rhi::device::Device;
use tilegpu_rhi::vertex::{Index, SpriteVertex};
use tilegpu_rhi::vk;

use crate::draw::Drawable;
use crate::error::{RenderError, RenderResult};
use crate::registry::Keyed;
use crate::texture::Texture;

/// Start of the identity range reserved for level tiles.
const TILE_ID_BASE: u64 = 1 << 62;

/// Caller-chosen object identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Wraps a caller-chosen identity.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Identity of the tile at (`column`, `row`) of a level.
    ///
    /// Tile identities live above `2^62`, away from small hand-picked ids.
    #[inline]
    pub const fn tile(column: u32, row: u32) -> Self {
        Self(TILE_ID_BASE | ((row as u64) << 32) | column as u64)
    }

    /// Returns true for identities created by [`ObjectId::tile`].
    #[inline]
    pub const fn is_tile(self) -> bool {
        self.0 & TILE_ID_BASE != 0
    }

    /// Returns the raw value.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tile() {
            let column = self.0 as u32;
            let row = ((self.0 & !TILE_ID_BASE) >> 32) as u32;
            write!(f, "tile({column}, {row})")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Where an object's texture comes from.
#[derive(Clone, Debug)]
pub enum TextureSource {
    /// Image file decoded on creation
    Path(PathBuf),
    /// Already decoded BGRA pixels
    Pixels(Pixels),
}

/// Checks that `indices` describe whole triangles over `vertices`.
pub fn validate_geometry(vertices: &[SpriteVertex], indices: &[Index]) -> Result<(), String> {
    if vertices.is_empty() || indices.is_empty() {
        return Err(format!(
            "{} vertices and {} indices, both must be non-empty",
            vertices.len(),
            indices.len()
        ));
    }
    if indices.len() % 3 != 0 {
        return Err(format!(
            "{} indices do not form whole triangles",
            indices.len()
        ));
    }
    if let Some(&index) = indices.iter().find(|&&i| usize::from(i) >= vertices.len()) {
        return Err(format!(
            "index {index} out of range for {} vertices",
            vertices.len()
        ));
    }
    Ok(())
}

/// Adds `offset` to every vertex position.
pub fn translate_vertices(vertices: &mut [SpriteVertex], offset: Vec2) {
    for vertex in vertices {
        vertex.position += offset;
    }
}

/// One renderable entity and its GPU resources.
pub struct GpuObject {
    id: ObjectId,
    vertices: Vec<SpriteVertex>,
    indices: Vec<Index>,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    texture: Texture,
}

impl GpuObject {
    /// Uploads vertices and indices and takes ownership of `texture`.
    ///
    /// If an upload fails, whatever was already created is released before
    /// the error is returned.
    pub fn new(
        device: &Arc<Device>,
        pool: &CommandPool,
        id: ObjectId,
        vertices: &[SpriteVertex],
        indices: &[Index],
        texture: Texture,
    ) -> RenderResult<Self> {
        validate_geometry(vertices, indices)
            .map_err(|message| RenderError::InvalidGeometry { id, message })?;

        let vertex_buffer = Buffer::from_data(
            device.clone(),
            pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(vertices),
        )?;
        let index_buffer = Buffer::from_data(
            device.clone(),
            pool,
            BufferUsage::Index,
            bytemuck::cast_slice(indices),
        )?;

        trace!(
            "Created object {} ({} vertices, {} indices)",
            id,
            vertices.len(),
            indices.len()
        );

        Ok(Self {
            id,
            vertices: vertices.to_vec(),
            indices: indices.to_vec(),
            vertex_buffer,
            index_buffer,
            texture,
        })
    }

    /// Moves the host copy of the vertices. The GPU buffer is untouched
    /// until [`upload_vertices`](Self::upload_vertices).
    pub fn translate(&mut self, dx: f32, dy: f32) {
        translate_vertices(&mut self.vertices, Vec2::new(dx, dy));
    }

    /// Re-uploads the host vertices through the staging path.
    ///
    /// The caller must make sure no pending frame reads the vertex buffer.
    pub fn upload_vertices(&self, pool: &CommandPool) -> RenderResult<()> {
        self.vertex_buffer
            .upload(pool, bytemuck::cast_slice(&self.vertices))?;
        Ok(())
    }

    /// Host copy of the vertices.
    #[inline]
    pub fn vertices(&self) -> &[SpriteVertex] {
        &self.vertices
    }

    /// Host copy of the indices.
    #[inline]
    pub fn indices(&self) -> &[Index] {
        &self.indices
    }
}

impl Keyed for GpuObject {
    fn id(&self) -> ObjectId {
        self.id
    }
}

impl Drawable for GpuObject {
    fn descriptor_set(&self, slot: usize) -> vk::DescriptorSet {
        self.texture.descriptor_set(slot)
    }

    fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}
