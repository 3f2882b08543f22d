//! Tile-map levels as renderer objects.
//!
//! Every occupied cell becomes one textured quad identified by
//! [`ObjectId::tile`]. The level grid is stretched over the whole viewport,
//! row 0 at the top.

use glam::Vec2;
use tracing::{debug, warn};

use tilegpu_assets::{Level, TileCell};
use tilegpu_rhi::vertex::{SpriteVertex, quad};

use crate::error::{RenderError, RenderResult};
use crate::object::ObjectId;

/// Top-left and bottom-right corners of a cell in normalized device
/// coordinates.
pub fn tile_rect(level: &Level, column: u32, row: u32) -> (Vec2, Vec2) {
    let cell = Vec2::new(2.0 / level.columns as f32, 2.0 / level.rows as f32);
    let min = Vec2::new(-1.0 + column as f32 * cell.x, -1.0 + row as f32 * cell.y);
    (min, min + cell)
}

/// The quad drawn for `cell`.
pub fn tile_vertices(level: &Level, cell: &TileCell) -> [SpriteVertex; 4] {
    let (min, max) = tile_rect(level, cell.column, cell.row);
    quad(min, max)
}

/// Creates one object per cell through `create`.
///
/// When a cell fails, every object created so far is handed to `destroy` in
/// reverse order and the failing cell is reported. `target` is passed to both
/// callbacks.
pub fn spawn_tiles<T, C, D>(
    target: &mut T,
    cells: &[TileCell],
    mut create: C,
    mut destroy: D,
) -> RenderResult<Vec<ObjectId>>
where
    C: FnMut(&mut T, &TileCell) -> RenderResult<ObjectId>,
    D: FnMut(&mut T, ObjectId),
{
    let mut created = Vec::with_capacity(cells.len());

    for cell in cells {
        match create(target, cell) {
            Ok(id) => created.push(id),
            Err(source) => {
                warn!(
                    "Tile at column {}, row {} failed, rolling back {} tile(s)",
                    cell.column,
                    cell.row,
                    created.len()
                );
                for id in created.into_iter().rev() {
                    destroy(target, id);
                }
                return Err(RenderError::TileFailed {
                    column: cell.column,
                    row: cell.row,
                    source: Box::new(source),
                });
            }
        }
    }

    debug!("Spawned {} tile object(s)", created.len());
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilegpu_assets::Pixels;

    fn level(columns: u32, rows: u32) -> Level {
        let tile = Pixels::solid(2, 2, [0, 0, 255, 255]);
        let mut cells = Vec::new();
        for row in 0..rows {
            for column in 0..columns {
                cells.push(TileCell {
                    column,
                    row,
                    tile_type: 0,
                    pixels: tile.clone(),
                });
            }
        }
        Level {
            columns,
            rows,
            tile_size: 2,
            cells,
        }
    }

    #[test]
    fn test_tile_rect_spans_viewport() {
        let level = level(4, 2);

        let (min, max) = tile_rect(&level, 0, 0);
        assert_eq!(min, Vec2::new(-1.0, -1.0));
        assert_eq!(max, Vec2::new(-0.5, 0.0));

        let (min, max) = tile_rect(&level, 3, 1);
        assert_eq!(min, Vec2::new(0.5, 0.0));
        assert_eq!(max, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_tile_vertices_cover_cell() {
        let level = level(2, 2);
        let cell = &level.cells[3];
        let vertices = tile_vertices(&level, cell);

        assert_eq!(vertices[0].position, Vec2::new(0.0, 0.0));
        assert_eq!(vertices[2].position, Vec2::new(1.0, 1.0));
        assert_eq!(vertices[0].tex_coord, Vec2::new(0.0, 0.0));
        assert_eq!(vertices[2].tex_coord, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_spawn_creates_one_object_per_cell() {
        let level = level(3, 2);
        let mut live = Vec::new();
        let ids = spawn_tiles(
            &mut live,
            &level.cells,
            |live, cell| {
                let id = ObjectId::tile(cell.column, cell.row);
                live.push(id);
                Ok(id)
            },
            |_, _| panic!("nothing should be destroyed"),
        )
        .unwrap();

        assert_eq!(ids.len(), 6);
        assert_eq!(ids, live);
        assert_eq!(ids[4], ObjectId::tile(1, 1));
    }

    #[test]
    fn test_spawn_rolls_back_on_failure() {
        let level = level(3, 1);
        let mut live: Vec<ObjectId> = Vec::new();
        let mut destroyed = Vec::new();

        let err = spawn_tiles(
            &mut live,
            &level.cells,
            |live, cell| {
                if cell.column == 2 {
                    return Err(RenderError::TooManyObjects { max: 2 });
                }
                let id = ObjectId::tile(cell.column, cell.row);
                live.push(id);
                Ok(id)
            },
            |live, id| {
                live.retain(|other| *other != id);
                destroyed.push(id);
            },
        )
        .unwrap_err();

        assert!(matches!(
            err,
            RenderError::TileFailed {
                column: 2,
                row: 0,
                ..
            }
        ));
        assert_eq!(destroyed, vec![ObjectId::tile(1, 0), ObjectId::tile(0, 0)]);
        assert!(live.is_empty());
    }
}
