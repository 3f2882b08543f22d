//! Sprite vertex format and the canonical quad.
//!
//! Every renderable object is a textured quad: four [`SpriteVertex`] values
//! and the six indices in [`QUAD_INDICES`].

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Index type used by every object.
pub type Index = u16;

/// Vulkan index type matching [`Index`].
pub const INDEX_TYPE: vk::IndexType = vk::IndexType::UINT16;

/// Two triangles covering a quad built by [`quad`].
pub const QUAD_INDICES: [Index; 6] = [0, 1, 2, 2, 3, 0];

/// 2D position plus texture coordinate.
///
/// # Memory Layout
///
/// - Offset 0: position (8 bytes)
/// - Offset 8: tex_coord (8 bytes)
/// - Total size: 16 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    /// Position in normalized device coordinates
    pub position: Vec2,
    /// Texture coordinate, (0, 0) is the top-left texel
    pub tex_coord: Vec2,
}

impl SpriteVertex {
    /// Creates a new vertex.
    #[inline]
    pub const fn new(position: Vec2, tex_coord: Vec2) -> Self {
        Self {
            position,
            tex_coord,
        }
    }

    /// Get the vertex input binding description.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Get the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(SpriteVertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(SpriteVertex, tex_coord) as u32,
            },
        ]
    }
}

/// Four vertices covering the rectangle from `min` (top-left) to `max`
/// (bottom-right), with the whole texture mapped onto it.
///
/// Ordered top-left, top-right, bottom-right, bottom-left, which is clockwise
/// on screen with Vulkan's downward y axis.
pub fn quad(min: Vec2, max: Vec2) -> [SpriteVertex; 4] {
    [
        SpriteVertex::new(Vec2::new(min.x, min.y), Vec2::new(0.0, 0.0)),
        SpriteVertex::new(Vec2::new(max.x, min.y), Vec2::new(1.0, 0.0)),
        SpriteVertex::new(Vec2::new(max.x, max.y), Vec2::new(1.0, 1.0)),
        SpriteVertex::new(Vec2::new(min.x, max.y), Vec2::new(0.0, 1.0)),
    ]
}

/// Quad covering the whole viewport.
pub fn unit_quad() -> [SpriteVertex; 4] {
    quad(Vec2::splat(-1.0), Vec2::splat(1.0))
}
