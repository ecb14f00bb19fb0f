//! The per-frame synchronization and submission loop.
//!
//! [`FrameScheduler`] drives a ring of [`FrameSlot`](crate::slot::FrameSlot)s
//! through the stages of one frame:
//!
//! ```text
//! 1. Wait on the current slot's completion marker (its previous use retired)
//! 2. Acquire a swap image (arms the slot's image-available signal)
//! 3. Record the command buffer
//! 4. Submit: reset the marker, wait image-available at color output,
//!    signal render-finished and the marker
//! 5. Present, gated on render-finished
//! 6. Advance to the next slot
//! ```
//!
//! Out-of-date results from acquire or present rebuild the display and keep
//! the slot pool. Everything else is returned to the caller.
//!
//! Each slot carries a [`SlotPhase`]. Stages 2 to 5 reject calls made out of
//! sequence with [`FrameError::OutOfOrder`]; advancing returns the slot to
//! idle.

use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use vkframe_core::RendererConfig;

use crate::backend::{
    AcquiredImage, CommandEncoder, CompletionMarker, Display, GpuDevice, PresentStatus,
    RenderTarget, Submission,
};
use crate::error::{FrameError, Stage};
use crate::frame_index::FrameIndex;
use crate::slot::{FramePool, SlotPhase};

/// Scheduler parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    pub frames_in_flight: usize,
    /// Bound on a single completion marker wait.
    pub fence_timeout: Duration,
    /// Bound on waiting for the next swap image.
    pub acquire_timeout: Duration,
    pub clear_color: [f32; 4],
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&RendererConfig::default())
    }
}

impl From<&RendererConfig> for SchedulerConfig {
    fn from(config: &RendererConfig) -> Self {
        Self {
            frames_in_flight: config.frames_in_flight,
            fence_timeout: config.fence_timeout,
            acquire_timeout: config.acquire_timeout,
            clear_color: config.clear_color,
        }
    }
}

/// What one call to [`FrameScheduler::run_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and queued for display. `reconstructed` is set
    /// when present (or a suboptimal acquire) asked for a rebuild, which has
    /// already happened.
    Presented { reconstructed: bool },
    /// Acquire reported the display out of date. Nothing was drawn, the
    /// display was rebuilt and the slot index did not move.
    Reconstructed,
    /// The display has a zero extent (minimized).
    Skipped,
}

/// Frames-in-flight scheduler over a [`GpuDevice`].
///
/// Single-threaded: the host thread that owns the scheduler is the only one
/// that records into or submits from its slots.
pub struct FrameScheduler<D: GpuDevice> {
    // Declared before `device` so slots are released first
    pool: FramePool<D>,
    index: FrameIndex,
    config: SchedulerConfig,
    device: D,
}

impl<D: GpuDevice> FrameScheduler<D> {
    /// Allocates `config.frames_in_flight` slots on `device`.
    pub fn new(device: D, config: SchedulerConfig) -> Result<Self, FrameError> {
        let pool = FramePool::initialize(&device, config.frames_in_flight)?;

        info!(
            "Frame scheduler ready: {} frame(s) in flight, fence timeout {:?}, acquire timeout {:?}",
            config.frames_in_flight, config.fence_timeout, config.acquire_timeout
        );

        Ok(Self {
            pool,
            index: FrameIndex::new(config.frames_in_flight),
            config,
            device,
        })
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn pool(&self) -> &FramePool<D> {
        &self.pool
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Index of the slot the next frame stages operate on.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.index.current()
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.index.frames_in_flight()
    }

    /// Blocks until the current slot's previous submission has retired.
    pub fn wait_for_slot(&mut self) -> Result<(), FrameError> {
        self.ensure_live()?;
        let current = self.index.current();
        let timeout = self.config.fence_timeout;

        let slot = self.pool.slot_mut(current);
        trace!("Waiting on completion marker of slot {}", current);
        slot.marker().wait(timeout).map_err(|e| {
            let err = FrameError::from_backend(Stage::Wait, e, Some(timeout));
            error!("Slot {}: {}", current, err);
            err
        })?;
        slot.mark_retired();
        Ok(())
    }

    /// Requests the next swap image, arming the current slot's
    /// image-available signal.
    ///
    /// The slot must be idle. On failure it stays idle, so a retry after
    /// reconstruction reuses it.
    pub fn acquire<S: Display<D>>(&mut self, display: &mut S) -> Result<AcquiredImage, FrameError> {
        self.ensure_live()?;
        self.ensure_phase(Stage::Acquire, |phase| phase == SlotPhase::Idle)?;
        let current = self.index.current();
        let timeout = self.config.acquire_timeout;
        let slot = self.pool.slot(current);

        let image = display
            .acquire_next_image(timeout, slot.image_available())
            .map_err(|e| FrameError::from_backend(Stage::Acquire, e, Some(timeout)))?;
        self.pool
            .slot_mut(current)
            .set_phase(SlotPhase::Acquired { image: image.index });

        trace!(
            "Slot {} acquired image {} (suboptimal: {})",
            current, image.index, image.suboptimal
        );
        Ok(image)
    }

    /// Re-records the current slot's command buffer for `image_index`.
    ///
    /// `image_index` must be the image this slot acquired. Recording again
    /// before submit is allowed. Fails with [`FrameError::OutstandingWork`]
    /// if the slot's previous submission has not retired.
    pub fn record<S, T, F>(
        &mut self,
        image_index: u32,
        display: &S,
        target: &T,
        mut draw: F,
    ) -> Result<(), FrameError>
    where
        S: Display<D>,
        T: RenderTarget<D, S>,
        F: FnMut(&D::CommandBuffer),
    {
        self.ensure_retired(Stage::Record)?;
        self.ensure_phase(Stage::Record, |phase| match phase {
            SlotPhase::Acquired { image } | SlotPhase::Recorded { image } => image == image_index,
            _ => false,
        })?;
        let current = self.index.current();
        let extent = display.extent();
        // A half-written buffer must not be submitted
        self.pool.slot_mut(current).set_phase(SlotPhase::Acquired { image: image_index });
        let fail = |e| FrameError::from_backend(Stage::Record, e, None);

        let cmd = self.pool.slot(current).command_buffer();
        cmd.reset().map_err(fail)?;
        cmd.begin().map_err(fail)?;
        target
            .begin_pass(cmd, display, image_index, self.config.clear_color)
            .map_err(fail)?;
        target.bind_pipeline(cmd);
        cmd.set_viewport(extent);
        cmd.set_scissor(extent);
        draw(cmd);
        target.end_pass(cmd);
        cmd.end().map_err(fail)?;
        self.pool.slot_mut(current).set_phase(SlotPhase::Recorded { image: image_index });

        trace!(
            "Slot {} recorded for image {} ({}x{})",
            current, image_index, extent.width, extent.height
        );
        Ok(())
    }

    /// Submits the current slot's command buffer.
    ///
    /// The marker is reset before the queue call. The slot only counts as in
    /// flight once the device has accepted the submission.
    pub fn submit(&mut self) -> Result<(), FrameError> {
        self.ensure_retired(Stage::Submit)?;
        let current = self.index.current();
        let slot = self.pool.slot(current);
        let image = match slot.phase() {
            SlotPhase::Recorded { image } => image,
            phase => return Err(self.out_of_order(Stage::Submit, phase)),
        };

        slot.marker()
            .reset()
            .map_err(|e| FrameError::from_backend(Stage::Submit, e, None))?;

        let submission = Submission {
            command_buffer: slot.command_buffer(),
            wait: slot.image_available(),
            signal: slot.render_finished(),
            marker: slot.marker(),
        };
        if let Err(e) = self.device.submit(submission) {
            let err = FrameError::from_backend(Stage::Submit, e, None);
            error!("Slot {}: {}", current, err);
            return Err(err);
        }

        let slot = self.pool.slot_mut(current);
        slot.mark_submitted();
        slot.set_phase(SlotPhase::Submitted { image });
        trace!("Slot {} submitted", current);
        Ok(())
    }

    /// Queues `image_index` for display once the current slot's
    /// render-finished signal fires.
    ///
    /// The slot must have submitted work for `image_index`; otherwise nothing
    /// would ever raise the signal present waits on.
    pub fn present<S: Display<D>>(
        &mut self,
        display: &mut S,
        image_index: u32,
    ) -> Result<PresentStatus, FrameError> {
        self.ensure_live()?;
        self.ensure_phase(Stage::Present, |phase| {
            phase == SlotPhase::Submitted { image: image_index }
        })?;
        let current = self.index.current();

        // The render-finished signal is consumed whether or not present succeeds
        let result = display
            .present(image_index, self.pool.slot(current).render_finished())
            .map_err(|e| FrameError::from_backend(Stage::Present, e, None));
        self.pool
            .slot_mut(current)
            .set_phase(SlotPhase::Presented { image: image_index });
        result
    }

    /// Moves to the next slot and returns its index.
    ///
    /// The slot being left returns to idle.
    pub fn advance(&mut self) -> usize {
        if !self.pool.is_destroyed() {
            let slot = self.pool.slot_mut(self.index.current());
            if let SlotPhase::Acquired { image } | SlotPhase::Recorded { image } = slot.phase() {
                warn!(
                    "Slot {} advanced without submitting acquired image {}",
                    slot.index(),
                    image
                );
            }
            slot.set_phase(SlotPhase::Idle);
        }
        let next = self.index.advance();
        trace!("Advanced to slot {}", next);
        next
    }

    /// Waits for the device to go idle and marks every slot retired.
    pub fn drain(&mut self) -> Result<(), FrameError> {
        self.device
            .wait_idle()
            .map_err(|e| FrameError::from_backend(Stage::Drain, e, None))?;
        self.pool
            .poll_all()
            .map_err(|source| FrameError::Fatal {
                stage: Stage::Drain,
                source,
            })?;
        debug!("Device drained");
        Ok(())
    }

    /// Drains the device and rebuilds the display. The slot pool is kept.
    pub fn reconstruct<S: Display<D>>(&mut self, display: &mut S) -> Result<(), FrameError> {
        self.drain()?;
        display.reconstruct().map_err(|e| {
            let err = FrameError::from_backend(Stage::Reconstruct, e, None);
            error!("{}", err);
            err
        })?;

        let extent = display.extent();
        info!("Display reconstructed at {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Releases the slot pool.
    ///
    /// Does not drain: if any slot still has unretired work this fails with
    /// [`FrameError::OutstandingWork`] and nothing is released.
    pub fn destroy(&mut self) -> Result<(), FrameError> {
        self.pool.destroy()
    }

    /// Drains the device, then releases the slot pool.
    pub fn shutdown(mut self) -> Result<(), FrameError> {
        if self.pool.is_destroyed() {
            return Ok(());
        }
        self.drain()?;
        self.destroy()
    }

    /// Runs one iteration of the frame loop.
    pub fn run_frame<S, T, F>(
        &mut self,
        display: &mut S,
        target: &T,
        draw: F,
    ) -> Result<FrameOutcome, FrameError>
    where
        S: Display<D>,
        T: RenderTarget<D, S>,
        F: FnMut(&D::CommandBuffer),
    {
        if display.extent().is_empty() {
            trace!("Display extent is zero, skipping frame");
            return Ok(FrameOutcome::Skipped);
        }

        self.wait_for_slot()?;

        let image = match self.acquire(display) {
            Ok(image) => image,
            Err(err) if err.is_recoverable() => {
                warn!("{}, reconstructing", err);
                self.reconstruct(display)?;
                return Ok(FrameOutcome::Reconstructed);
            }
            Err(err) => return Err(err),
        };

        self.record(image.index, display, target, draw)?;
        self.submit()?;

        let stale = match self.present(display, image.index) {
            Ok(PresentStatus::Optimal) => image.suboptimal,
            Ok(PresentStatus::Suboptimal) => {
                debug!("Present reported suboptimal");
                true
            }
            Err(err) if err.is_recoverable() => {
                warn!("{}, reconstructing", err);
                true
            }
            Err(err) => return Err(err),
        };

        self.advance();

        if stale {
            self.reconstruct(display)?;
        }
        Ok(FrameOutcome::Presented {
            reconstructed: stale,
        })
    }

    fn ensure_live(&self) -> Result<(), FrameError> {
        if self.pool.is_destroyed() {
            return Err(FrameError::Destroyed);
        }
        Ok(())
    }

    /// The current slot's phase must satisfy `allowed`.
    fn ensure_phase(
        &self,
        stage: Stage,
        allowed: impl FnOnce(SlotPhase) -> bool,
    ) -> Result<(), FrameError> {
        let phase = self.pool.slot(self.index.current()).phase();
        if allowed(phase) {
            return Ok(());
        }
        Err(self.out_of_order(stage, phase))
    }

    fn out_of_order(&self, stage: Stage, phase: SlotPhase) -> FrameError {
        let slot = self.index.current();
        error!("{} out of order on slot {} ({})", stage, slot, phase);
        FrameError::OutOfOrder { stage, slot, phase }
    }

    /// The current slot must have no unretired submission.
    fn ensure_retired(&mut self, stage: Stage) -> Result<(), FrameError> {
        self.ensure_live()?;
        let current = self.index.current();
        match self.pool.slot_mut(current).poll_retired() {
            Ok(true) => Ok(()),
            Ok(false) => {
                error!("{}: slot {} still has unretired work", stage, current);
                Err(FrameError::OutstandingWork { slot: current })
            }
            Err(source) => Err(FrameError::Fatal { stage, source }),
        }
    }
}

impl<D: GpuDevice> Drop for FrameScheduler<D> {
    fn drop(&mut self) {
        if self.pool.is_destroyed() {
            return;
        }
        if let Err(e) = self.drain() {
            error!("Failed to drain device during teardown: {}", e);
        }
        if let Err(e) = self.pool.destroy() {
            error!("Failed to destroy frame pool: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_renderer_config() {
        let renderer = RendererConfig {
            frames_in_flight: 3,
            fence_timeout: Duration::from_millis(40),
            acquire_timeout: Duration::from_millis(20),
            clear_color: [0.1, 0.2, 0.3, 1.0],
            ..RendererConfig::default()
        };
        let config = SchedulerConfig::from(&renderer);
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.fence_timeout, Duration::from_millis(40));
        assert_eq!(config.acquire_timeout, Duration::from_millis(20));
        assert_eq!(config.clear_color, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn test_default_config_double_buffers() {
        assert_eq!(SchedulerConfig::default().frames_in_flight, 2);
    }
}
