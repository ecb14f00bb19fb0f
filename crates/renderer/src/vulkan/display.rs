use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, info};

use vkframe_rhi::RhiResult;
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::render_pass::{Framebuffer, RenderPass};
use vkframe_rhi::swapchain::Swapchain;
use vkframe_rhi::sync::Semaphore;

use super::device::{VulkanFrameDevice, map_vk_result};
use crate::backend::{AcquiredImage, BackendError, Display, Extent, PresentStatus};

/// Swapchain, the render pass compatible with its format and one framebuffer
/// per swap image.
pub struct SwapchainDisplay {
    // Framebuffers reference the swapchain's image views and go first
    framebuffers: Vec<Framebuffer>,
    render_pass: Arc<RenderPass>,
    swapchain: Swapchain,
    device: Arc<Device>,
    requested: Extent,
}

impl SwapchainDisplay {
    /// Builds the swapchain for `surface` at the window's size.
    ///
    /// The surface must outlive the display.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        size: Extent,
        prefer_vsync: bool,
    ) -> RhiResult<Self> {
        let swapchain = Swapchain::new(
            instance,
            Arc::clone(&device),
            surface,
            surface_loader,
            size.width,
            size.height,
            prefer_vsync,
        )?;
        let render_pass = Arc::new(RenderPass::new(Arc::clone(&device), swapchain.format())?);
        let framebuffers = Framebuffer::for_image_views(
            &device,
            &render_pass,
            swapchain.image_views(),
            swapchain.extent(),
        )?;

        info!(
            "Display ready: {} images, {:?}, {:?}",
            swapchain.image_count(),
            swapchain.format(),
            swapchain.present_mode()
        );

        Ok(Self {
            framebuffers,
            render_pass,
            swapchain,
            device,
            requested: size,
        })
    }

    /// Records the window size the next [`reconstruct`](Display::reconstruct)
    /// should target. A zero dimension makes [`extent`](Display::extent)
    /// report an empty surface until the window is restored.
    pub fn set_requested_size(&mut self, width: u32, height: u32) {
        self.requested = Extent::new(width, height);
    }

    #[inline]
    pub fn requested_size(&self) -> Extent {
        self.requested
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn render_pass(&self) -> &Arc<RenderPass> {
        &self.render_pass
    }

    /// Framebuffer for swap image `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> Option<&Framebuffer> {
        self.framebuffers.get(image_index as usize)
    }
}

impl Display<VulkanFrameDevice> for SwapchainDisplay {
    fn extent(&self) -> Extent {
        if self.requested.is_empty() {
            return Extent::default();
        }
        let extent = self.swapchain.extent();
        Extent::new(extent.width, extent.height)
    }

    fn acquire_next_image(
        &mut self,
        timeout: Duration,
        signal: &Semaphore,
    ) -> Result<AcquiredImage, BackendError> {
        let (index, suboptimal) = self
            .swapchain
            .acquire_next_image(timeout, signal.handle())
            .map_err(map_vk_result)?;
        Ok(AcquiredImage { index, suboptimal })
    }

    fn present(&mut self, image_index: u32, wait: &Semaphore) -> Result<PresentStatus, BackendError> {
        let suboptimal = self
            .swapchain
            .present(self.device.present_queue(), image_index, wait.handle())
            .map_err(map_vk_result)?;
        Ok(if suboptimal {
            PresentStatus::Suboptimal
        } else {
            PresentStatus::Optimal
        })
    }

    fn reconstruct(&mut self) -> Result<(), BackendError> {
        let Extent { width, height } = self.requested;

        self.framebuffers.clear();
        self.swapchain.recreate(width, height)?;

        // The pipeline was built against this render pass
        if self.swapchain.format() != self.render_pass.format() {
            return Err(BackendError::Api(format!(
                "swapchain format changed from {:?} to {:?}",
                self.render_pass.format(),
                self.swapchain.format()
            )));
        }

        self.framebuffers = Framebuffer::for_image_views(
            &self.device,
            &self.render_pass,
            self.swapchain.image_views(),
            self.swapchain.extent(),
        )?;

        debug!(
            "Rebuilt {} framebuffers at {}x{}",
            self.framebuffers.len(),
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }
}
