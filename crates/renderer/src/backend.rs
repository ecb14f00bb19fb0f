//! Seams between the frame scheduler and a GPU API.
//!
//! The scheduler only needs a handful of operations from the device, the
//! display and the render target. Keeping them behind traits lets the same
//! scheduler drive Vulkan in the application and a scripted device in tests.

use std::time::Duration;

use thiserror::Error;

/// Errors a backend reports to the scheduler.
///
/// Backends map their native status codes onto these; the scheduler decides
/// which class each one belongs to based on the stage it came from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The display surface changed and must be reconstructed.
    #[error("surface out of date")]
    OutOfDate,

    /// A bounded wait expired.
    #[error("timed out")]
    Timeout,

    #[error("device lost")]
    DeviceLost,

    #[error("out of memory")]
    OutOfMemory,

    /// Any other failure, with the native status for diagnostics.
    #[error("{0}")]
    Api(String),
}

/// Width and height of a presentable surface, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-sized surface (minimized window) cannot be rendered to.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Result of a successful acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Swap image index; unrelated to the frame slot index.
    pub index: u32,
    /// The image is usable but the surface should be reconstructed soon.
    pub suboptimal: bool,
}

/// Result of a successful present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
}

/// Host-observable completion marker (a fence).
pub trait CompletionMarker {
    /// Blocks until signaled or until `timeout` expires ([`BackendError::Timeout`]).
    fn wait(&self, timeout: Duration) -> Result<(), BackendError>;

    /// Returns the marker to the unsignaled state.
    fn reset(&self) -> Result<(), BackendError>;

    /// Non-blocking status query.
    fn is_signaled(&self) -> Result<bool, BackendError>;
}

/// Command buffer operations the scheduler issues itself.
///
/// Pass-specific commands (render pass, pipeline, draws) go through the
/// [`RenderTarget`] and the draw callback, which know the concrete type.
pub trait CommandEncoder {
    fn reset(&self) -> Result<(), BackendError>;
    fn begin(&self) -> Result<(), BackendError>;
    fn end(&self) -> Result<(), BackendError>;
    fn set_viewport(&self, extent: Extent);
    fn set_scissor(&self, extent: Extent);
}

/// One queue submission: wait on `wait` at the color-output stage, then
/// signal `signal` and `marker` when the work retires.
pub struct Submission<'a, C, S, M> {
    pub command_buffer: &'a C,
    pub wait: &'a S,
    pub signal: &'a S,
    pub marker: &'a M,
}

/// Device-side factory and queue.
pub trait GpuDevice {
    type CommandBuffer: CommandEncoder;
    /// Device-side signal (semaphore).
    type Signal;
    type Marker: CompletionMarker;

    fn create_command_buffer(&self) -> Result<Self::CommandBuffer, BackendError>;
    fn create_signal(&self) -> Result<Self::Signal, BackendError>;
    fn create_marker(&self, signaled: bool) -> Result<Self::Marker, BackendError>;

    /// Enqueues exactly one submission on the graphics queue.
    fn submit(
        &self,
        submission: Submission<'_, Self::CommandBuffer, Self::Signal, Self::Marker>,
    ) -> Result<(), BackendError>;

    /// Blocks until every queue is idle.
    fn wait_idle(&self) -> Result<(), BackendError>;
}

/// The display subsystem: owns the swap images and hands them out by index.
pub trait Display<D: GpuDevice> {
    fn extent(&self) -> Extent;

    /// Requests the next image; `signal` fires once it is actually ready.
    fn acquire_next_image(
        &mut self,
        timeout: Duration,
        signal: &D::Signal,
    ) -> Result<AcquiredImage, BackendError>;

    /// Queues `image_index` for display after `wait` fires.
    fn present(&mut self, image_index: u32, wait: &D::Signal)
    -> Result<PresentStatus, BackendError>;

    /// Rebuilds the swap images for the current surface state.
    fn reconstruct(&mut self) -> Result<(), BackendError>;
}

/// Render pass and pipeline the scheduler records around the draw callback.
pub trait RenderTarget<D: GpuDevice, S: Display<D>> {
    fn begin_pass(
        &self,
        cmd: &D::CommandBuffer,
        display: &S,
        image_index: u32,
        clear_color: [f32; 4],
    ) -> Result<(), BackendError>;

    fn bind_pipeline(&self, cmd: &D::CommandBuffer);

    fn end_pass(&self, cmd: &D::CommandBuffer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_is_empty() {
        assert!(Extent::new(0, 600).is_empty());
        assert!(Extent::new(800, 0).is_empty());
        assert!(!Extent::new(800, 600).is_empty());
        assert!(Extent::default().is_empty());
    }

    #[test]
    fn test_backend_error_display() {
        assert_eq!(BackendError::OutOfDate.to_string(), "surface out of date");
        assert_eq!(
            BackendError::Api("ERROR_INITIALIZATION_FAILED".into()).to_string(),
            "ERROR_INITIALIZATION_FAILED"
        );
    }
}
