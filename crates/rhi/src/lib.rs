//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Scoped wrappers over the Vulkan objects vkframe needs, built on `ash`:
//! - Instance creation with optional validation
//! - Physical device selection per surface and logical device creation
//! - Swapchain management
//! - Render pass, framebuffers, shaders and the graphics pipeline
//! - Command pools and buffers
//! - Semaphores and fences
//!
//! Every wrapper destroys its Vulkan object on drop.

mod error;

pub mod command;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
