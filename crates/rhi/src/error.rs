//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// No physical device satisfies the requirements for the given surface
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// SPIR-V could not be read or is malformed
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Swapchain cannot be created for the surface
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RhiError {
    /// The underlying Vulkan result code, if this error came from a Vulkan call.
    pub fn vk_result(&self) -> Option<ash::vk::Result> {
        match self {
            Self::VulkanError(result) => Some(*result),
            _ => None,
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
