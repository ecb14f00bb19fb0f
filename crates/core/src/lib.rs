//! Core utilities for vkframe.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Renderer configuration (defaults plus environment overrides)
//! - Frame timing for FPS reporting

mod config;
mod error;
mod logging;
mod timer;

pub use config::{RendererConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameTimer;
