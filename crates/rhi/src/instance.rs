//! Vulkan instance management.
//!
//! Handles VkInstance creation, validation layer selection and the debug
//! messenger that forwards driver messages to `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::instance::{Instance, ValidationSettings};
//!
//! // Surface extensions normally come from the windowing layer.
//! let instance = Instance::new(&[], ValidationSettings::enabled(cfg!(debug_assertions)))
//!     .expect("Failed to create Vulkan instance");
//! let vk_instance = instance.handle();
//! ```

use std::ffi::{CStr, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, trace, warn};

use crate::error::RhiError;

/// Validation layers in order of preference.
///
/// Older SDKs only ship the LunarG meta-layer.
pub const VALIDATION_LAYER_CANDIDATES: &[&CStr] = &[
    c"VK_LAYER_KHRONOS_validation",
    c"VK_LAYER_LUNARG_standard_validation",
];

/// Validation options for instance creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationSettings {
    pub enabled: bool,
    /// Also forward INFO and VERBOSE messages.
    pub verbose: bool,
}

impl ValidationSettings {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled,
            verbose: false,
        }
    }
}

/// Vulkan instance wrapper with optional validation layer support.
///
/// Destroys the debug messenger and the instance on drop. Every object created
/// from it (surface, device) must be dropped first.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    validation_layer: Option<&'static CStr>,
}

impl Instance {
    /// Creates a new Vulkan instance targeting API 1.0.
    ///
    /// * `surface_extensions` - Extension names required by the window system,
    ///   as returned by `ash_window::enumerate_required_extensions`. Empty for
    ///   headless use.
    /// * `validation` - Requested validation. When no validation layer is
    ///   installed the instance is created without one and a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan library cannot be loaded or instance or
    /// debug messenger creation fails.
    pub fn new(
        surface_extensions: &[*const c_char],
        validation: ValidationSettings,
    ) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        let validation_layer = if validation.enabled {
            let layer = Self::find_validation_layer(&entry)?;
            if layer.is_none() {
                warn!("Validation requested but no validation layer is installed");
            }
            layer
        } else {
            None
        };

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"vkframe")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extensions = surface_extensions.to_vec();
        if validation_layer.is_some() {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers: Vec<*const c_char> = validation_layer.iter().map(|l| l.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created (API 1.0, {} extension(s))",
            extensions.len()
        );

        let (debug_utils, debug_messenger) = if let Some(layer) = validation_layer {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = match Self::setup_debug_messenger(&debug_utils, validation.verbose) {
                Ok(messenger) => messenger,
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            };
            info!("Validation enabled via {:?}", layer);
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
            validation_layer,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether a validation layer and messenger are active.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// The validation layer in use, if any.
    #[inline]
    pub fn validation_layer(&self) -> Option<&'static CStr> {
        self.validation_layer
    }

    fn find_validation_layer(entry: &Entry) -> Result<Option<&'static CStr>, RhiError> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        let names: Vec<&CStr> = available_layers
            .iter()
            .filter_map(|layer| layer.layer_name_as_c_str().ok())
            .collect();

        trace!("Available instance layers: {:?}", names);

        Ok(pick_validation_layer(&names))
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
        verbose: bool,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(messenger_severity(verbose))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };

        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Picks the first preferred validation layer present in `available`.
pub fn pick_validation_layer(available: &[&CStr]) -> Option<&'static CStr> {
    VALIDATION_LAYER_CANDIDATES
        .iter()
        .copied()
        .find(|candidate| available.contains(candidate))
}

fn messenger_severity(verbose: bool) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    let base = vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    if verbose {
        base | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
    } else {
        base
    }
}

/// Forwards validation layer messages to `tracing`.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid (or null) callback data pointer.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!(target: "vulkan", "[{}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!(target: "vulkan", "[{}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            info!(target: "vulkan", "[{}] {}", type_str, message);
        }
        _ => {
            debug!(target: "vulkan", "[{}] {}", type_str, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_validation_layer_prefers_khronos() {
        let available = [
            c"VK_LAYER_LUNARG_standard_validation",
            c"VK_LAYER_KHRONOS_validation",
        ];
        assert_eq!(
            pick_validation_layer(&available),
            Some(c"VK_LAYER_KHRONOS_validation")
        );
    }

    #[test]
    fn test_pick_validation_layer_falls_back_to_lunarg() {
        let available = [c"VK_LAYER_MESA_device_select", c"VK_LAYER_LUNARG_standard_validation"];
        assert_eq!(
            pick_validation_layer(&available),
            Some(c"VK_LAYER_LUNARG_standard_validation")
        );
    }

    #[test]
    fn test_pick_validation_layer_none() {
        assert_eq!(pick_validation_layer(&[c"VK_LAYER_MESA_overlay"]), None);
        assert_eq!(pick_validation_layer(&[]), None);
    }

    #[test]
    fn test_messenger_severity() {
        let quiet = messenger_severity(false);
        assert!(quiet.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING));
        assert!(!quiet.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));

        let verbose = messenger_severity(true);
        assert!(verbose.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
    }

    #[test]
    fn test_instance_creation_headless() {
        // Requires a Vulkan loader
        match Instance::new(&[], ValidationSettings::default()) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(RhiError::VulkanError(e)) => {
                eprintln!("Skipping test: no usable driver ({e})");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_instance_creation_with_validation() {
        match Instance::new(&[], ValidationSettings::enabled(true)) {
            Ok(instance) => {
                assert_eq!(instance.has_validation(), instance.validation_layer().is_some());
            }
            Err(RhiError::LoadingError(_)) | Err(RhiError::VulkanError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }
}
