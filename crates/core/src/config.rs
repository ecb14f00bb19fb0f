//! Renderer configuration.
//!
//! Every field has a sensible default; `VKFRAME_*` environment variables
//! override individual values without a config file.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Window parameters handed to the platform layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "vkframe".to_string(),
        }
    }
}

/// Settings for the renderer and its frame scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Number of frame slots allowed to have unretired GPU work at once.
    pub frames_in_flight: usize,
    /// Upper bound on a single host wait for a slot's completion fence.
    pub fence_timeout: Duration,
    /// Upper bound on waiting for the next swapchain image.
    pub acquire_timeout: Duration,
    /// RGBA color the render pass clears to.
    pub clear_color: [f32; 4],
    /// Enable Vulkan validation layers and the debug messenger.
    pub validation: bool,
    /// Forward INFO and VERBOSE validation messages as well as warnings.
    pub verbose_validation: bool,
    /// Prefer FIFO over MAILBOX presentation.
    pub vsync: bool,
    pub window: WindowConfig,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

const DEFAULT_SHADER_DIR: &str = "shaders/spirv";
const VERTEX_SHADER_FILE: &str = "triangle.vert.spv";
const FRAGMENT_SHADER_FILE: &str = "triangle.frag.spv";

impl Default for RendererConfig {
    fn default() -> Self {
        let shader_dir = PathBuf::from(DEFAULT_SHADER_DIR);
        Self {
            frames_in_flight: 2,
            fence_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(5),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            validation: cfg!(debug_assertions),
            verbose_validation: false,
            vsync: false,
            window: WindowConfig::default(),
            vertex_shader: shader_dir.join(VERTEX_SHADER_FILE),
            fragment_shader: shader_dir.join(FRAGMENT_SHADER_FILE),
        }
    }
}

impl RendererConfig {
    /// Build a configuration from defaults overridden by `VKFRAME_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(n) = parse_var::<usize>(&lookup, "VKFRAME_FRAMES_IN_FLIGHT")? {
            config.frames_in_flight = n;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "VKFRAME_FENCE_TIMEOUT_MS")? {
            config.fence_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "VKFRAME_ACQUIRE_TIMEOUT_MS")? {
            config.acquire_timeout = Duration::from_millis(ms);
        }
        if let Some(flag) = parse_flag(&lookup, "VKFRAME_VALIDATION")? {
            config.validation = flag;
        }
        if let Some(flag) = parse_flag(&lookup, "VKFRAME_VERBOSE_VALIDATION")? {
            config.verbose_validation = flag;
        }
        if let Some(flag) = parse_flag(&lookup, "VKFRAME_VSYNC")? {
            config.vsync = flag;
        }
        if let Some(width) = parse_var::<u32>(&lookup, "VKFRAME_WIDTH")? {
            config.window.width = width;
        }
        if let Some(height) = parse_var::<u32>(&lookup, "VKFRAME_HEIGHT")? {
            config.window.height = height;
        }
        if let Some(dir) = lookup("VKFRAME_SHADER_DIR") {
            let dir = PathBuf::from(dir);
            config.vertex_shader = dir.join(VERTEX_SHADER_FILE);
            config.fragment_shader = dir.join(FRAGMENT_SHADER_FILE);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the renderer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(Error::Config(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}={raw:?}: {e}"))),
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(None),
        Some("1" | "true" | "on" | "yes") => Ok(Some(true)),
        Some("0" | "false" | "off" | "no") => Ok(Some(false)),
        Some(other) => Err(Error::Config(format!(
            "{key}={other:?}: expected 1/0, true/false, on/off or yes/no"
        ))),
    }
}
