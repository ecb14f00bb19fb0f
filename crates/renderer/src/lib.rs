//! Frame scheduling for vkframe.
//!
//! - [`backend`] defines the device, display and render target seams
//! - [`FrameScheduler`] runs the wait / acquire / record / submit / present
//!   loop over a ring of [`FrameSlot`]s
//! - [`vulkan`] implements the seams on top of `vkframe-rhi`
//! - [`Renderer`] wires a window, the Vulkan backend and the scheduler together

pub mod backend;
pub mod error;
pub mod frame_index;
pub mod scheduler;
pub mod slot;
pub mod vulkan;

mod renderer;

pub use error::{ErrorClass, FrameError, Stage};
pub use frame_index::FrameIndex;
pub use renderer::{Renderer, RendererError};
pub use scheduler::{FrameOutcome, FrameScheduler, SchedulerConfig};
pub use slot::{FramePool, FrameSlot, SlotPhase};
