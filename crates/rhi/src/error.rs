//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// Another thread panicked while holding the allocator lock
    #[error("GPU allocator lock is poisoned")]
    AllocatorPoisoned,

    /// No physical device passed every requirement
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No memory type matches both the requirement mask and the wanted properties
    #[error("No compatible memory type (type bits {type_bits:#b}, properties {flags:?})")]
    NoCompatibleMemory {
        /// Requirement mask reported by the driver.
        type_bits: u32,
        /// Properties the caller asked for.
        flags: vk::MemoryPropertyFlags,
    },

    /// Shader module error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface query error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline or render pass creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
