//! winit window and the Vulkan surface presented into it.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes, WindowId};

use vkframe_core::{Error, Result, WindowConfig};

/// Owned `VkSurfaceKHR`, destroyed on drop.
///
/// The instance it was created from must outlive it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Creates a surface for `window`.
    pub fn create(entry: &ash::Entry, instance: &ash::Instance, window: &Window) -> Result<Self> {
        let display_handle = window
            .inner()
            .display_handle()
            .map_err(|e| Error::Window(format!("display handle unavailable: {e}")))?;
        let window_handle = window
            .inner()
            .window_handle()
            .map_err(|e| Error::Window(format!("window handle unavailable: {e}")))?;

        // SAFETY: both handles come from a live winit window, and the surface
        // is destroyed in Drop before the caller destroys the instance.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| Error::Vulkan(format!("surface creation failed: {e}")))?;

        info!("Vulkan surface created");

        Ok(Self {
            handle,
            loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Surface extension loader, for capability, format and present mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
        debug!("Vulkan surface destroyed");
    }
}

/// Resizable application window.
pub struct Window {
    window: Arc<WinitWindow>,
}

impl Window {
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        info!(
            "Window created: {}x{} \"{}\"",
            config.width, config.height, config.title
        );

        Ok(Self {
            window: Arc::new(window),
        })
    }

    #[inline]
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    #[inline]
    pub fn id(&self) -> WindowId {
        self.window.id()
    }

    /// Current drawable size in physical pixels.
    pub fn size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Minimized windows report a zero dimension on most platforms.
    pub fn is_minimized(&self) -> bool {
        let (width, height) = self.size();
        !is_renderable_size(width, height)
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to create a surface for this window.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("display handle unavailable: {e}")))?;
        required_extensions(display_handle.as_raw())
    }
}

/// Instance extensions needed to create a surface on `display_handle`.
///
/// The returned pointers reference static strings owned by `ash-window`.
pub fn required_extensions(display_handle: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let extensions = ash_window::enumerate_required_extensions(display_handle)
        .map_err(|e| Error::Vulkan(format!("cannot enumerate surface extensions: {e}")))?;

    debug!(
        "Surface extensions: {:?}",
        extensions
            .iter()
            // SAFETY: ash-window returns valid NUL-terminated static names
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect::<Vec<_>>()
    );

    Ok(extensions.to_vec())
}

/// A swapchain can only be built for a non-zero size.
#[inline]
pub fn is_renderable_size(width: u32, height: u32) -> bool {
    width > 0 && height > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_renderable_size() {
        assert!(is_renderable_size(800, 600));
        assert!(!is_renderable_size(0, 600));
        assert!(!is_renderable_size(800, 0));
    }
}
