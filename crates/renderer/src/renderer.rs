//! Vulkan renderer facade.
//!
//! Builds the whole Vulkan stack for a window and drives the triangle through
//! the [`FrameScheduler`].

use std::mem::ManuallyDrop;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use vkframe_core::RendererConfig;
use vkframe_platform::{Surface, Window, is_renderable_size};
use vkframe_rhi::RhiError;
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::{Instance, ValidationSettings};
use vkframe_rhi::physical_device::select_physical_device;

use crate::backend::{Display, Extent};
use crate::error::{FrameError, Stage};
use crate::scheduler::{FrameOutcome, FrameScheduler, SchedulerConfig};
use crate::vulkan::{SwapchainDisplay, TrianglePass, VulkanFrameDevice};

/// Errors from building or running the renderer.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Core(#[from] vkframe_core::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl RendererError {
    /// Frame stage for scheduler errors; setup errors belong to initialization.
    pub fn stage(&self) -> Stage {
        match self {
            RendererError::Frame(err) => err.stage(),
            RendererError::Rhi(_) | RendererError::Core(_) => Stage::Initialize,
        }
    }
}

/// Owns every Vulkan object needed to put the triangle on screen.
///
/// # Destruction order
///
/// 1. Drain the device and release the frame slots
/// 2. Pipeline and pipeline layout
/// 3. Framebuffers, render pass and swapchain
/// 4. Logical device
/// 5. Surface
/// 6. Instance
pub struct Renderer {
    instance: ManuallyDrop<Instance>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    scheduler: ManuallyDrop<FrameScheduler<VulkanFrameDevice>>,
    display: ManuallyDrop<SwapchainDisplay>,
    pass: ManuallyDrop<TrianglePass>,

    /// Latest window size not yet applied to the swapchain.
    pending_resize: Option<(u32, u32)>,
    gpu_name: String,
}

impl Renderer {
    pub fn new(window: &Window, config: &RendererConfig) -> Result<Self, RendererError> {
        config.validate()?;

        let extensions = window.required_extensions()?;
        let instance = Instance::new(
            &extensions,
            ValidationSettings {
                enabled: config.validation,
                verbose: config.verbose_validation,
            },
        )?;

        let surface = Surface::create(instance.entry(), instance.handle(), window)?;

        let gpu = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        info!(
            "Selected GPU: {} ({})",
            gpu.device_name(),
            gpu.device_type_name()
        );

        let device = Device::new(&instance, &gpu)?;

        let (width, height) = match window.size() {
            (w, h) if is_renderable_size(w, h) => (w, h),
            _ => (config.window.width, config.window.height),
        };
        let display = SwapchainDisplay::new(
            &instance,
            Arc::clone(&device),
            surface.handle(),
            surface.loader().clone(),
            Extent::new(width, height),
            config.vsync,
        )?;

        let pass = TrianglePass::new(
            Arc::clone(&device),
            Arc::clone(display.render_pass()),
            &config.vertex_shader,
            &config.fragment_shader,
        )?;

        let frame_device = VulkanFrameDevice::new(Arc::clone(&device))?;
        let scheduler = FrameScheduler::new(frame_device, SchedulerConfig::from(config))?;

        info!("Renderer initialized at {}x{}", width, height);

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            scheduler: ManuallyDrop::new(scheduler),
            display: ManuallyDrop::new(display),
            pass: ManuallyDrop::new(pass),
            pending_resize: None,
            gpu_name: gpu.device_name().to_string(),
        })
    }

    /// Renders one frame.
    ///
    /// A pending resize is applied first. Zero-sized windows are skipped
    /// without touching the device.
    pub fn render_frame(&mut self) -> Result<FrameOutcome, RendererError> {
        if let Some((width, height)) = self.pending_resize.take() {
            self.display.set_requested_size(width, height);
            if is_renderable_size(width, height) {
                self.scheduler.reconstruct(&mut *self.display)?;
            } else {
                debug!("Window minimized, pausing rendering");
            }
        }

        let outcome =
            self.scheduler
                .run_frame(&mut *self.display, &*self.pass, TrianglePass::draw)?;
        Ok(outcome)
    }

    /// Records a new window size; the swapchain is rebuilt on the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        debug!("Resize requested: {}x{}", width, height);
        self.pending_resize = Some((width, height));
    }

    /// Blocks until the GPU has finished all submitted frames.
    pub fn wait_idle(&mut self) -> Result<(), RendererError> {
        self.scheduler.drain()?;
        Ok(())
    }

    /// Size of the images currently being presented; zero while minimized.
    pub fn extent(&self) -> Extent {
        self.display.extent()
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.scheduler.frames_in_flight()
    }

    #[inline]
    pub fn gpu_name(&self) -> &str {
        &self.gpu_name
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        info!("Shutting down renderer");

        // SAFETY: each field is taken or dropped exactly once, here, and never
        // touched again.
        unsafe {
            let scheduler = ManuallyDrop::take(&mut self.scheduler);
            if let Err(e) = scheduler.shutdown() {
                error!("Frame scheduler shutdown failed: {}", e);
            }

            ManuallyDrop::drop(&mut self.pass);
            ManuallyDrop::drop(&mut self.display);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;

    #[test]
    fn test_error_stage() {
        let err = RendererError::from(FrameError::Fatal {
            stage: Stage::Submit,
            source: BackendError::DeviceLost,
        });
        assert_eq!(err.stage(), Stage::Submit);
        assert_eq!(err.to_string(), "submit failed: device lost");

        let err = RendererError::from(RhiError::NoSuitableGpu);
        assert_eq!(err.stage(), Stage::Initialize);
    }
}
