//! Asset loading.
//!
//! This crate handles the external inputs the renderer consumes:
//! - Images decoded into tightly packed BGRA8 pixels
//! - Opaque binary blobs (pre-compiled shaders)
//! - Tile-map levels that cut a tileset image into per-cell textures

mod binary;
mod error;
mod pixels;
mod tilemap;

pub use binary::read_binary;
pub use error::{AssetError, AssetResult};
pub use pixels::{BYTES_PER_PIXEL, Pixels, load_image};
pub use tilemap::{Level, TileCell};
