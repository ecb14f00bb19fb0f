//! Vulkan implementation of the frame scheduler backend.

mod device;
mod display;
mod pass;

pub use device::{VulkanFrameDevice, map_vk_result};
pub use display::SwapchainDisplay;
pub use pass::TrianglePass;
