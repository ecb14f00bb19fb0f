//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] - GPU-to-GPU ordering between queue operations
//! - [`Fence`] - GPU-to-CPU completion, the host-observable marker of a submission
//!
//! Both are scoped handles: dropping one destroys the Vulkan object. The caller
//! is responsible for making sure no pending queue operation still references
//! it; the frame scheduler does this by draining before teardown.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::trace;

use crate::device::Device;
use crate::error::RhiResult;

/// Converts a host timeout into the nanosecond count Vulkan expects.
///
/// Durations that do not fit in `u64` nanoseconds saturate to `u64::MAX`,
/// which Vulkan treats as an unbounded wait.
pub fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

/// Vulkan semaphore wrapper.
///
/// Used for the image-available and render-finished signals of a frame slot.
/// Created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new binary semaphore in the unsignaled state.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        trace!("Created semaphore {:?}", semaphore);

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        trace!("Destroyed semaphore {:?}", self.semaphore);
    }
}

/// Vulkan fence wrapper.
///
/// A fence is signaled by the device when the submission it was attached to
/// retires. The host waits on it before reusing anything that submission
/// referenced.
///
/// Wait and status queries return the raw [`vk::Result`] so callers can tell
/// `TIMEOUT` and `ERROR_DEVICE_LOST` apart without string matching.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// * `signaled` - If true, the fence starts signaled so the first wait on
    ///   it returns immediately.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        trace!(
            "Created fence {:?} ({})",
            fence,
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` expires.
    ///
    /// # Errors
    ///
    /// - `vk::Result::TIMEOUT` if the timeout expired first
    /// - `vk::Result::ERROR_DEVICE_LOST` or an out-of-memory code otherwise
    pub fn wait(&self, timeout: Duration) -> Result<(), vk::Result> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout_nanos(timeout))
        }
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be attached to a pending queue submission.
    pub fn reset(&self) -> Result<(), vk::Result> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences) }
    }

    /// Non-blocking status query.
    pub fn is_signaled(&self) -> Result<bool, vk::Result> {
        unsafe { self.device.handle().get_fence_status(self.fence) }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        trace!("Destroyed fence {:?}", self.fence);
    }
}
