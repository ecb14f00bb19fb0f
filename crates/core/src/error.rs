//! Error types shared by the vkframe crates.

use thiserror::Error;

/// Main error type for the non-GPU parts of vkframe.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Surface creation or surface extension queries failed
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Invalid configuration value, with the offending variable or field
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_error_display() {
        let err = Error::Window("no display".to_string());
        assert_eq!(err.to_string(), "Window error: no display");
    }

    #[test]
    fn test_config_error_display() {
        let err = Error::Config("VKFRAME_WIDTH: not a number".to_string());
        assert_eq!(err.to_string(), "Config error: VKFRAME_WIDTH: not a number");
    }
}
