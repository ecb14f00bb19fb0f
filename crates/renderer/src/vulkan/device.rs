use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::debug;

use vkframe_rhi::RhiError;
use vkframe_rhi::command::{CommandBuffer, CommandPool, full_scissor, full_viewport};
use vkframe_rhi::device::Device;
use vkframe_rhi::sync::{Fence, Semaphore};

use crate::backend::{
    BackendError, CommandEncoder, CompletionMarker, Extent, GpuDevice, Submission,
};

/// Maps a Vulkan status onto the scheduler's error kinds.
pub fn map_vk_result(result: vk::Result) -> BackendError {
    match result {
        vk::Result::ERROR_OUT_OF_DATE_KHR => BackendError::OutOfDate,
        vk::Result::TIMEOUT | vk::Result::NOT_READY => BackendError::Timeout,
        vk::Result::ERROR_DEVICE_LOST | vk::Result::ERROR_SURFACE_LOST_KHR => {
            BackendError::DeviceLost
        }
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            BackendError::OutOfMemory
        }
        other => BackendError::Api(format!("{other:?}")),
    }
}

impl From<RhiError> for BackendError {
    fn from(err: RhiError) -> Self {
        match err.vk_result() {
            Some(result) => map_vk_result(result),
            None => BackendError::Api(err.to_string()),
        }
    }
}

fn extent_2d(extent: Extent) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

impl CompletionMarker for Fence {
    fn wait(&self, timeout: Duration) -> Result<(), BackendError> {
        Fence::wait(self, timeout).map_err(map_vk_result)
    }

    fn reset(&self) -> Result<(), BackendError> {
        Fence::reset(self).map_err(map_vk_result)
    }

    fn is_signaled(&self) -> Result<bool, BackendError> {
        Fence::is_signaled(self).map_err(map_vk_result)
    }
}

impl CommandEncoder for CommandBuffer {
    fn reset(&self) -> Result<(), BackendError> {
        CommandBuffer::reset(self).map_err(BackendError::from)
    }

    fn begin(&self) -> Result<(), BackendError> {
        CommandBuffer::begin(self).map_err(BackendError::from)
    }

    fn end(&self) -> Result<(), BackendError> {
        CommandBuffer::end(self).map_err(BackendError::from)
    }

    fn set_viewport(&self, extent: Extent) {
        CommandBuffer::set_viewport(self, &full_viewport(extent_2d(extent)));
    }

    fn set_scissor(&self, extent: Extent) {
        CommandBuffer::set_scissor(self, &full_scissor(extent_2d(extent)));
    }
}

/// Logical device plus the graphics command pool slots allocate from.
#[derive(Clone)]
pub struct VulkanFrameDevice {
    device: Arc<Device>,
    pool: Arc<CommandPool>,
}

impl VulkanFrameDevice {
    /// Creates a resettable command pool on the graphics family.
    pub fn new(device: Arc<Device>) -> Result<Self, RhiError> {
        let family = device
            .queue_families()
            .graphics
            .ok_or(RhiError::NoSuitableGpu)?;
        let pool = Arc::new(CommandPool::new(Arc::clone(&device), family)?);
        debug!("Frame device ready on queue family {}", family);
        Ok(Self { device, pool })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn command_pool(&self) -> &Arc<CommandPool> {
        &self.pool
    }
}

impl GpuDevice for VulkanFrameDevice {
    type CommandBuffer = CommandBuffer;
    type Signal = Semaphore;
    type Marker = Fence;

    fn create_command_buffer(&self) -> Result<CommandBuffer, BackendError> {
        Ok(CommandBuffer::new(&self.pool)?)
    }

    fn create_signal(&self) -> Result<Semaphore, BackendError> {
        Ok(Semaphore::new(Arc::clone(&self.device))?)
    }

    fn create_marker(&self, signaled: bool) -> Result<Fence, BackendError> {
        Ok(Fence::new(Arc::clone(&self.device), signaled)?)
    }

    fn submit(
        &self,
        submission: Submission<'_, CommandBuffer, Semaphore, Fence>,
    ) -> Result<(), BackendError> {
        let wait_semaphores = [submission.wait.handle()];
        // Vertex work may start before the image is ready
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [submission.command_buffer.handle()];
        let signal_semaphores = [submission.signal.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the slot owning these objects outlives the submission; the
        // scheduler waits on the fence before reusing or releasing them.
        let result = unsafe {
            self.device
                .submit_graphics(std::slice::from_ref(&submit_info), submission.marker.handle())
        };
        result.map_err(map_vk_result)
    }

    fn wait_idle(&self) -> Result<(), BackendError> {
        self.device.wait_idle().map_err(map_vk_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_vk_result() {
        assert_eq!(
            map_vk_result(vk::Result::ERROR_OUT_OF_DATE_KHR),
            BackendError::OutOfDate
        );
        assert_eq!(map_vk_result(vk::Result::TIMEOUT), BackendError::Timeout);
        assert_eq!(map_vk_result(vk::Result::NOT_READY), BackendError::Timeout);
        assert_eq!(
            map_vk_result(vk::Result::ERROR_DEVICE_LOST),
            BackendError::DeviceLost
        );
        assert_eq!(
            map_vk_result(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            BackendError::OutOfMemory
        );
        assert!(matches!(
            map_vk_result(vk::Result::ERROR_INITIALIZATION_FAILED),
            BackendError::Api(_)
        ));
    }

    #[test]
    fn test_rhi_error_conversion() {
        let err: BackendError = RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST).into();
        assert_eq!(err, BackendError::DeviceLost);

        let err: BackendError = RhiError::ShaderError("bad magic".into()).into();
        assert_eq!(err, BackendError::Api("Shader error: bad magic".into()));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VulkanFrameDevice>();
    }
}
