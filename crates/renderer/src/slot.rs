//! Frame slots and the fixed-size pool that owns them.
//!
//! Each slot bundles a command buffer with the three synchronization objects
//! one frame in flight needs. The pool also tracks, on the host, which slots
//! have a submission whose retirement has not been observed yet; teardown is
//! refused while any of those markers is still unsignaled.

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info, trace};

use crate::backend::{BackendError, CompletionMarker, GpuDevice};
use crate::error::{FrameError, Stage};

/// Upper bound on the best-effort wait a dropped pool performs per busy slot.
const DROP_WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Where a slot is in its acquire, record, submit, present sequence.
///
/// Each stage only accepts the phase the previous one leaves behind, so the
/// image-available signal is armed once per use and present never waits on
/// a render-finished signal no submission will raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    /// Free for acquire.
    Idle,
    Acquired { image: u32 },
    Recorded { image: u32 },
    Submitted { image: u32 },
    /// Queued for display; the slot stays here until the index advances.
    Presented { image: u32 },
}

impl fmt::Display for SlotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotPhase::Idle => f.write_str("idle"),
            SlotPhase::Acquired { image } => write!(f, "holding acquired image {image}"),
            SlotPhase::Recorded { image } => write!(f, "recorded for image {image}"),
            SlotPhase::Submitted { image } => write!(f, "submitted for image {image}"),
            SlotPhase::Presented { image } => write!(f, "presented image {image}"),
        }
    }
}

/// Resources for one frame in flight.
pub struct FrameSlot<D: GpuDevice> {
    index: usize,
    command_buffer: D::CommandBuffer,
    image_available: D::Signal,
    render_finished: D::Signal,
    marker: D::Marker,
    in_flight: bool,
    phase: SlotPhase,
}

impl<D: GpuDevice> FrameSlot<D> {
    fn new(device: &D, index: usize) -> Result<Self, BackendError> {
        Ok(Self {
            index,
            command_buffer: device.create_command_buffer()?,
            image_available: device.create_signal()?,
            render_finished: device.create_signal()?,
            // Signaled so the first use of every slot does not block
            marker: device.create_marker(true)?,
            in_flight: false,
            phase: SlotPhase::Idle,
        })
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn command_buffer(&self) -> &D::CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn image_available(&self) -> &D::Signal {
        &self.image_available
    }

    #[inline]
    pub fn render_finished(&self) -> &D::Signal {
        &self.render_finished
    }

    #[inline]
    pub fn marker(&self) -> &D::Marker {
        &self.marker
    }

    /// Whether a submission from this slot may still be executing.
    #[inline]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    #[inline]
    pub fn phase(&self) -> SlotPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: SlotPhase) {
        trace!("Slot {}: {} -> {}", self.index, self.phase, phase);
        self.phase = phase;
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.in_flight = true;
    }

    pub(crate) fn mark_retired(&mut self) {
        self.in_flight = false;
    }

    /// Polls the marker if the slot is in flight and clears the flag when the
    /// submission has retired.
    ///
    /// Returns `true` when the slot is free for reuse.
    pub(crate) fn poll_retired(&mut self) -> Result<bool, BackendError> {
        if self.in_flight && self.marker.is_signaled()? {
            trace!("Slot {} retired", self.index);
            self.in_flight = false;
        }
        Ok(!self.in_flight)
    }
}

/// Fixed ring of frame slots.
pub struct FramePool<D: GpuDevice> {
    slots: Vec<FrameSlot<D>>,
}

impl<D: GpuDevice> FramePool<D> {
    /// Allocates `n` slots.
    ///
    /// If any allocation fails, the slots and objects created so far are
    /// released before the error is returned.
    pub fn initialize(device: &D, n: usize) -> Result<Self, FrameError> {
        if n == 0 {
            return Err(FrameError::InvalidConfig(
                "frames in flight must be at least 1".to_string(),
            ));
        }

        let mut slots = Vec::with_capacity(n);
        for index in 0..n {
            let slot = FrameSlot::new(device, index).map_err(|source| {
                error!("Failed to allocate frame slot {}: {}", index, source);
                FrameError::Allocation {
                    slot: index,
                    source,
                }
            })?;
            debug!("Allocated frame slot {}", index);
            slots.push(slot);
        }

        info!("Frame pool initialized with {} slot(s)", n);
        Ok(Self { slots })
    }

    /// Number of slots; zero once destroyed.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether [`destroy`](Self::destroy) has already released the slots.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn slot(&self, index: usize) -> &FrameSlot<D> {
        &self.slots[index]
    }

    #[inline]
    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut FrameSlot<D> {
        &mut self.slots[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot<D>> {
        self.slots.iter()
    }

    /// Number of slots whose last submission has not been observed retired.
    pub fn in_flight_count(&self) -> usize {
        self.slots.iter().filter(|s| s.in_flight).count()
    }

    /// Clears the in-flight flag of every slot whose marker is signaled.
    pub(crate) fn poll_all(&mut self) -> Result<(), BackendError> {
        for slot in &mut self.slots {
            slot.poll_retired()?;
        }
        Ok(())
    }

    /// Releases every slot.
    ///
    /// # Errors
    ///
    /// [`FrameError::OutstandingWork`] if a slot's submission has not retired.
    /// The pool is left intact in that case; drain the device and call again.
    pub fn destroy(&mut self) -> Result<(), FrameError> {
        for slot in &mut self.slots {
            let retired = slot.poll_retired().map_err(|source| FrameError::Fatal {
                stage: Stage::Destroy,
                source,
            })?;
            if !retired {
                error!(
                    "Refusing to destroy frame pool: slot {} has unretired work",
                    slot.index
                );
                return Err(FrameError::OutstandingWork { slot: slot.index });
            }
        }

        let count = self.slots.len();
        self.slots.clear();
        info!("Frame pool destroyed ({} slot(s))", count);
        Ok(())
    }
}

impl<D: GpuDevice> Drop for FramePool<D> {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            if !slot.in_flight {
                continue;
            }
            error!(
                "Frame slot {} dropped with unretired work; waiting on its marker",
                slot.index
            );
            if let Err(e) = slot.marker.wait(DROP_WAIT_TIMEOUT) {
                error!("Frame slot {} marker wait failed: {}", slot.index, e);
            }
        }
    }
}
