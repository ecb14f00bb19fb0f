//! Platform layer: the winit window and the Vulkan surface that presents into it.

mod window;

pub use window::{Surface, Window, is_renderable_size, required_extensions};

// Re-export winit types the application needs
pub use winit::application::ApplicationHandler;
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
pub use winit::window::WindowId;
