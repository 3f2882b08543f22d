//! Tile-map levels.
//!
//! A level is a small TOML file naming a tileset image and a grid of rows.
//! Each character of a row selects a tile type: a hexadecimal digit is an
//! index into the tileset (read left to right, top to bottom), while `.` or
//! a space leaves the cell empty.
//!
//! ```toml
//! tileset = "tiles.png"   # relative to the level file
//! tile_size = 16
//! rows = [
//!     "0001",
//!     ".23.",
//! ]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::{AssetError, AssetResult};
use crate::pixels::{Pixels, load_image};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LevelFile {
    tileset: PathBuf,
    tile_size: u32,
    rows: Vec<String>,
}

/// One occupied cell of a level.
#[derive(Clone, Debug)]
pub struct TileCell {
    pub column: u32,
    pub row: u32,
    /// Index of the tile within the tileset.
    pub tile_type: u32,
    /// The tile's sub-image.
    pub pixels: Pixels,
}

/// A decoded level: grid dimensions plus every occupied cell in row-major order.
#[derive(Clone, Debug)]
pub struct Level {
    pub columns: u32,
    pub rows: u32,
    pub tile_size: u32,
    pub cells: Vec<TileCell>,
}

impl Level {
    /// Loads a level file and cuts its tileset into per-cell images.
    pub fn load(path: impl AsRef<Path>) -> AssetResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => AssetError::FileNotFound(path.to_path_buf()),
            _ => AssetError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let file: LevelFile = toml::from_str(&content).map_err(|source| AssetError::LevelParse {
            path: path.to_path_buf(),
            source,
        })?;

        let tileset_path = path
            .parent()
            .map(|dir| dir.join(&file.tileset))
            .unwrap_or_else(|| file.tileset.clone());
        let tileset = load_image(&tileset_path)?;

        let level = Self::from_parts(&file.rows, file.tile_size, &tileset).map_err(|message| {
            AssetError::InvalidLevel {
                path: path.to_path_buf(),
                message,
            }
        })?;

        debug!(
            "Loaded level {} ({}x{} grid, {} tiles)",
            path.display(),
            level.columns,
            level.rows,
            level.cells.len()
        );
        Ok(level)
    }

    /// Builds a level from already-decoded rows and tileset.
    pub fn from_parts(
        rows: &[String],
        tile_size: u32,
        tileset: &Pixels,
    ) -> Result<Self, String> {
        if tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if rows.is_empty() {
            return Err("level has no rows".to_string());
        }

        let atlas_columns = tileset.width() / tile_size;
        let atlas_rows = tileset.height() / tile_size;
        let tile_count = atlas_columns * atlas_rows;
        if tile_count == 0 {
            return Err(format!(
                "tileset {}x{} is smaller than one {tile_size}px tile",
                tileset.width(),
                tileset.height()
            ));
        }

        let columns = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0) as u32;
        let mut cells = Vec::new();

        for (row, line) in rows.iter().enumerate() {
            for (column, symbol) in line.chars().enumerate() {
                let Some(tile_type) = parse_symbol(symbol).map_err(|_| {
                    format!("unexpected symbol '{symbol}' at column {column}, row {row}")
                })?
                else {
                    continue;
                };

                if tile_type >= tile_count {
                    return Err(format!(
                        "tile type {tile_type} at column {column}, row {row} is outside the {tile_count}-tile tileset"
                    ));
                }

                let pixels = tileset
                    .crop(
                        (tile_type % atlas_columns) * tile_size,
                        (tile_type / atlas_columns) * tile_size,
                        tile_size,
                        tile_size,
                    )
                    .map_err(|e| e.to_string())?;

                trace!("Tile {tile_type} at ({column}, {row})");
                cells.push(TileCell {
                    column: column as u32,
                    row: row as u32,
                    tile_type,
                    pixels,
                });
            }
        }

        Ok(Self {
            columns,
            rows: rows.len() as u32,
            tile_size,
            cells,
        })
    }
}

/// `Ok(None)` for an empty cell, `Ok(Some(index))` for a tile.
fn parse_symbol(symbol: char) -> Result<Option<u32>, ()> {
    match symbol {
        '.' | ' ' => Ok(None),
        _ => symbol.to_digit(16).map(Some).ok_or(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2x2-tile tileset of 2px tiles, tile `n` filled with blue channel `n`.
    fn tileset() -> Pixels {
        let mut data = Vec::new();
        for y in 0..4u32 {
            for x in 0..4u32 {
                let tile = (y / 2) * 2 + x / 2;
                data.extend_from_slice(&[tile as u8, 0, 0, 255]);
            }
        }
        Pixels::from_bgra(data, 4, 4).unwrap()
    }

    fn rows(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_symbol() {
        assert_eq!(parse_symbol('.'), Ok(None));
        assert_eq!(parse_symbol(' '), Ok(None));
        assert_eq!(parse_symbol('3'), Ok(Some(3)));
        assert_eq!(parse_symbol('b'), Ok(Some(11)));
        assert!(parse_symbol('#').is_err());
    }

    #[test]
    fn test_cells_in_row_major_order() {
        let level = Level::from_parts(&rows(&["01.", "..3"]), 2, &tileset()).unwrap();

        assert_eq!(level.columns, 3);
        assert_eq!(level.rows, 2);
        let positions: Vec<_> = level
            .cells
            .iter()
            .map(|c| (c.column, c.row, c.tile_type))
            .collect();
        assert_eq!(positions, vec![(0, 0, 0), (1, 0, 1), (2, 1, 3)]);
    }

    #[test]
    fn test_cell_pixels_come_from_tileset() {
        let level = Level::from_parts(&rows(&["2"]), 2, &tileset()).unwrap();
        let cell = &level.cells[0];
        assert_eq!(cell.pixels.width(), 2);
        assert!(cell.pixels.data().chunks(4).all(|p| p[0] == 2));
    }

    #[test]
    fn test_tile_outside_tileset() {
        let err = Level::from_parts(&rows(&["4"]), 2, &tileset()).unwrap_err();
        assert!(err.contains("outside"));
    }

    #[test]
    fn test_bad_symbol_reports_position() {
        let err = Level::from_parts(&rows(&["0", ".x"]), 2, &tileset()).unwrap_err();
        assert!(err.contains("column 1, row 1"));
    }

    #[test]
    fn test_zero_tile_size() {
        assert!(Level::from_parts(&rows(&["0"]), 0, &tileset()).is_err());
    }
}
