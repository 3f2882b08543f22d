//! Semi-transparent menu overlay.

use glam::Vec2;

use tilegpu_assets::Pixels;
use tilegpu_renderer::{ObjectId, RenderResult, Renderer, TextureSource};
use tilegpu_rhi::vertex::{QUAD_INDICES, quad};

/// Identity of the overlay object.
pub const OVERLAY_ID: ObjectId = ObjectId::new(1);

/// Distance moved per arrow key press, in normalized device coordinates.
pub const STEP: f32 = 0.05;

/// BGRA color of the overlay: dark grey at roughly 60% opacity.
const OVERLAY_COLOR: [u8; 4] = [40, 40, 40, 160];

const HALF_SIZE: Vec2 = Vec2::new(0.4, 0.3);

/// Tracks where the overlay sits so it reappears in the same place.
#[derive(Debug, Default)]
pub struct Overlay {
    center: Vec2,
}

impl Overlay {
    /// Shows the overlay if hidden, hides it otherwise.
    ///
    /// Returns whether it is now visible.
    pub fn toggle(&self, renderer: &mut Renderer) -> RenderResult<bool> {
        if renderer.find_object(OVERLAY_ID).is_some() {
            renderer.destroy_object(OVERLAY_ID)?;
            return Ok(false);
        }

        let vertices = quad(self.center - HALF_SIZE, self.center + HALF_SIZE);
        renderer.create_object(
            OVERLAY_ID,
            &vertices,
            &QUAD_INDICES,
            TextureSource::Pixels(Pixels::solid(1, 1, OVERLAY_COLOR)),
        )?;
        Ok(true)
    }

    /// Moves the overlay by `offset` and uploads the new position.
    ///
    /// Does nothing while the overlay is hidden.
    pub fn nudge(&mut self, renderer: &mut Renderer, offset: Vec2) -> RenderResult<()> {
        if renderer.transform_object(OVERLAY_ID, offset.x, offset.y) {
            self.center += offset;
            renderer.update_object_vertices(OVERLAY_ID)?;
        }
        Ok(())
    }
}
