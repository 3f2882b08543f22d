//! Renderer error types.

use thiserror::Error;

use tilegpu_assets::AssetError;
use tilegpu_rhi::RhiError;

use crate::object::ObjectId;

/// Renderer error type.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Vulkan layer failure
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Asset loading failure
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Window or surface failure
    #[error(transparent)]
    Platform(#[from] tilegpu_core::Error),

    /// An object with this identity is already live
    #[error("Object {0} already exists")]
    DuplicateObject(ObjectId),

    /// Vertices or indices cannot form a drawable object
    #[error("Invalid geometry for object {id}: {message}")]
    InvalidGeometry { id: ObjectId, message: String },

    /// The descriptor pool cannot hold another textured object
    #[error("Object limit of {max} reached")]
    TooManyObjects {
        /// Configured maximum.
        max: u32,
    },

    /// Creating the object for one level tile failed
    #[error("Failed to create tile at column {column}, row {row}: {source}")]
    TileFailed {
        column: u32,
        row: u32,
        #[source]
        source: Box<RenderError>,
    },

    /// Too many frames in a row failed outside the swapchain-staleness path
    #[error("{consecutive} consecutive frame failures (threshold {threshold})")]
    TooManyFrameFailures {
        consecutive: u32,
        threshold: u32,
    },
}

/// Result type alias for renderer operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
