//! Physical device (GPU) selection.
//!
//! Selection is always evaluated against one surface: queue families and
//! swapchain support are queried for each (device, surface) pair and stored
//! in the returned [`PhysicalDeviceInfo`]. Nothing is cached across calls, so
//! selecting again for a different surface gives fresh answers.
//!
//! A device is suitable when:
//! 1. it exposes every extension in [`REQUIRED_DEVICE_EXTENSIONS`],
//! 2. its swapchain support for the surface is adequate,
//! 3. it has a graphics queue family and a family that can present.
//!
//! Among suitable devices the highest [`rate_device`] score wins.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions every selected GPU must support.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue family indices for the operations the renderer needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family that supports graphics operations.
    pub graphics: Option<u32>,
    /// Family that can present to the surface.
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Unique family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics {
            families.push(graphics);
        }
        if let Some(present) = self.present
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }

    /// Whether graphics and present use different families.
    #[inline]
    pub fn is_split(&self) -> bool {
        self.graphics != self.present
    }
}

/// Everything learned about a physical device while selecting it for a surface.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_families: QueueFamilyIndices,
    /// Surface support as queried during selection. The swapchain re-queries
    /// on every (re)creation since capabilities change with window size.
    pub swapchain_support: SwapchainSupportDetails,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        device_type_name(self.properties.device_type)
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}

/// Selects the most suitable physical device for rendering to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no enumerated device passes the
/// suitability checks.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut best: Option<(PhysicalDeviceInfo, u32)> = None;

    for device in devices {
        let Some(info) = check_device_suitability(instance, device, surface, surface_loader)?
        else {
            continue;
        };

        let score = rate_device(&info.properties);
        debug!(
            "GPU '{}' ({}) - Score: {}",
            info.device_name(),
            info.device_type_name(),
            score
        );

        if best.as_ref().is_none_or(|(_, best_score)| score > *best_score) {
            best = Some((info, score));
        }
    }

    let Some((selected, score)) = best else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        score
    );

    Ok(selected)
}

/// Runs the suitability checks for one device against one surface.
///
/// `Ok(None)` means the device was inspected and rejected; `Err` means a
/// query itself failed.
fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<Option<PhysicalDeviceInfo>, RhiError> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let device_name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "Unknown".to_string());

    let extensions = unsafe { instance.enumerate_device_extension_properties(device)? };
    let extension_names: Vec<&CStr> = extensions
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .collect();
    if let Some(missing) = missing_extension(&extension_names, REQUIRED_DEVICE_EXTENSIONS) {
        debug!("GPU '{}' skipped: missing extension {:?}", device_name, missing);
        return Ok(None);
    }

    let swapchain_support = SwapchainSupportDetails::query(device, surface, surface_loader)?;
    if !swapchain_support.is_adequate() {
        debug!(
            "GPU '{}' skipped: inadequate swapchain support ({} formats, {} present modes)",
            device_name,
            swapchain_support.formats.len(),
            swapchain_support.present_modes.len()
        );
        return Ok(None);
    }

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let queue_families = find_queue_families(&families, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    });
    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing required queue families (graphics={}, present={})",
            device_name,
            queue_families.graphics.is_some(),
            queue_families.present.is_some()
        );
        return Ok(None);
    }

    Ok(Some(PhysicalDeviceInfo {
        device,
        properties,
        queue_families,
        swapchain_support,
    }))
}

/// Returns the first required extension absent from `available`.
pub fn missing_extension<'a>(available: &[&CStr], required: &[&'a CStr]) -> Option<&'a CStr> {
    required
        .iter()
        .copied()
        .find(|name| !available.contains(name))
}

/// Picks graphics and present families from a device's queue family list.
///
/// `supports_present` is asked for each family index in order. A family that
/// can do both is preferred so the swapchain can use exclusive sharing.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;

        if family.queue_count == 0 {
            continue;
        }

        let has_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let can_present = supports_present(i);

        if has_graphics && can_present {
            return QueueFamilyIndices {
                graphics: Some(i),
                present: Some(i),
            };
        }

        if has_graphics && indices.graphics.is_none() {
            indices.graphics = Some(i);
        }
        if can_present && indices.present.is_none() {
            indices.present = Some(i);
        }
    }

    indices
}

/// Rates a physical device. Higher is better.
pub fn rate_device(properties: &vk::PhysicalDeviceProperties) -> u32 {
    let type_score = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 100_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 10_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1_000,
        vk::PhysicalDeviceType::CPU => 100,
        _ => 1,
    };

    // max_image_dimension2_d is at most 65536 on shipping hardware, below the
    // gap between type tiers
    type_score + properties.limits.max_image_dimension2_d.min(65_536) / 8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    fn properties(device_type: vk::PhysicalDeviceType, max_dim: u32) -> vk::PhysicalDeviceProperties {
        vk::PhysicalDeviceProperties {
            device_type,
            limits: vk::PhysicalDeviceLimits {
                max_image_dimension2_d: max_dim,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(indices.graphics.is_none());
        assert!(indices.present.is_none());
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_unique_families() {
        let same = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        };
        assert_eq!(same.unique_families(), vec![0]);
        assert!(!same.is_split());

        let split = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(2),
        };
        assert_eq!(split.unique_families(), vec![0, 2]);
        assert!(split.is_split());
    }

    #[test]
    fn test_find_queue_families_prefers_combined_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
        ];
        // Family 0 cannot present, family 1 and 2 can
        let indices = find_queue_families(&families, |i| i != 0);
        assert_eq!(indices.graphics, Some(2));
        assert_eq!(indices.present, Some(2));
    }

    #[test]
    fn test_find_queue_families_split() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
        ];
        let indices = find_queue_families(&families, |i| i == 1);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert!(indices.is_complete());
    }

    #[test]
    fn test_find_queue_families_skips_empty_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::COMPUTE, 1),
        ];
        let indices = find_queue_families(&families, |_| true);
        assert_eq!(indices.graphics, None);
        assert_eq!(indices.present, Some(1));
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_find_queue_families_is_per_query() {
        // Same device, two surfaces with different present support
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        let first = find_queue_families(&families, |i| i == 0);
        let second = find_queue_families(&families, |i| i == 1);
        assert_eq!(first.present, Some(0));
        assert_eq!(second.present, Some(1));
    }

    #[test]
    fn test_missing_extension() {
        let available = [ash::khr::swapchain::NAME, c"VK_KHR_maintenance1"];
        assert_eq!(missing_extension(&available, REQUIRED_DEVICE_EXTENSIONS), None);
        assert_eq!(
            missing_extension(&[c"VK_KHR_maintenance1"], REQUIRED_DEVICE_EXTENSIONS),
            Some(ash::khr::swapchain::NAME)
        );
    }

    #[test]
    fn test_rate_device_prefers_discrete() {
        let discrete = rate_device(&properties(vk::PhysicalDeviceType::DISCRETE_GPU, 4096));
        let integrated = rate_device(&properties(vk::PhysicalDeviceType::INTEGRATED_GPU, 65_536));
        let cpu = rate_device(&properties(vk::PhysicalDeviceType::CPU, 65_536));
        assert!(discrete > integrated);
        assert!(integrated > cpu);
    }

    #[test]
    fn test_rate_device_breaks_ties_on_image_dimension() {
        let small = rate_device(&properties(vk::PhysicalDeviceType::DISCRETE_GPU, 8192));
        let large = rate_device(&properties(vk::PhysicalDeviceType::DISCRETE_GPU, 16384));
        assert!(large > small);
    }
}
