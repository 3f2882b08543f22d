//! Physical device (GPU) selection.
//!
//! Selection runs in two passes over the enumerated GPUs: discrete GPUs
//! first, then every remaining device, each pass in enumeration order. A
//! device is a candidate when it has:
//! 1. A queue family that supports graphics and can present to the surface
//! 2. The swapchain device extension
//! 3. The geometry shader and sampler anisotropy features
//!
//! [`select_device`] returns every candidate in preference order. The caller
//! tries them in turn, because logical device and swapchain creation can
//! still fail on a device that looks suitable.
//!
//! # Example
//!
//! ```no_run
//! use tilegpu_rhi::instance::Instance;
//! use tilegpu_rhi::physical_device::select_device;
//! use ash::vk;
//!
//! let instance = Instance::new(c"demo", false, &[]).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let candidates = select_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//! println!("Preferred GPU: {}", candidates[0].device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, trace, warn};

use crate::error::{RhiError, RhiResult};

/// Device extensions every candidate must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Information about a candidate physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory types and heaps.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// The single queue family used for both graphics and presentation.
    pub queue_family: u32,
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

    /// Returns the device type (Discrete, Integrated, etc.).
    pub fn device_type(&self) -> vk::PhysicalDeviceType {
        self.properties.device_type
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
            .field("queue_family", &self.queue_family)
            .finish()
    }
}

/// Returns every suitable physical device, most preferred first.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if there are no GPUs at all or none
/// meets the requirements.
pub fn select_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<Vec<PhysicalDeviceInfo>> {
    // SAFETY: instance is a live Vulkan instance.
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let device_types: Vec<vk::PhysicalDeviceType> = devices
        .iter()
        // SAFETY: Each handle was just enumerated from this instance.
        .map(|&device| unsafe { instance.get_physical_device_properties(device) }.device_type)
        .collect();

    let candidates: Vec<PhysicalDeviceInfo> = candidate_order(&device_types)
        .into_iter()
        .filter_map(|index| {
            check_device_suitability(instance, devices[index], surface, surface_loader)
        })
        .collect();

    if candidates.is_empty() {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    }

    debug!(
        "GPU candidates in preference order: {:?}",
        candidates.iter().map(|c| c.device_name()).collect::<Vec<_>>()
    );

    Ok(candidates)
}

/// Indices of `device_types` in selection order: discrete GPUs first, then
/// the rest, each group in enumeration order.
pub fn candidate_order(device_types: &[vk::PhysicalDeviceType]) -> Vec<usize> {
    let is_discrete = |t: &vk::PhysicalDeviceType| *t == vk::PhysicalDeviceType::DISCRETE_GPU;

    let discrete = device_types
        .iter()
        .enumerate()
        .filter(|(_, t)| is_discrete(t))
        .map(|(i, _)| i);
    let others = device_types
        .iter()
        .enumerate()
        .filter(|(_, t)| !is_discrete(t))
        .map(|(i, _)| i);

    discrete.chain(others).collect()
}

/// Names of required features the device lacks. Empty means all present.
pub fn missing_features(features: &vk::PhysicalDeviceFeatures) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if features.geometry_shader == vk::FALSE {
        missing.push("geometryShader");
    }
    if features.sampler_anisotropy == vk::FALSE {
        missing.push("samplerAnisotropy");
    }
    missing
}

/// Whether `name` appears in `available`.
pub fn has_extension(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|ext| ext.extension_name_as_c_str().ok() == Some(name))
}

/// First family with at least one queue that supports graphics and presentation.
pub fn find_queue_family(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> Option<u32> {
    families
        .iter()
        .enumerate()
        .filter(|(_, family)| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|(i, _)| i as u32)
        .find(|&i| supports_present(i))
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    // SAFETY: device was enumerated from this instance.
    let (properties, features, memory_properties, families, extensions) = unsafe {
        (
            instance.get_physical_device_properties(device),
            instance.get_physical_device_features(device),
            instance.get_physical_device_memory_properties(device),
            instance.get_physical_device_queue_family_properties(device),
            instance
                .enumerate_device_extension_properties(device)
                .unwrap_or_default(),
        )
    };

    let name = properties
        .device_name_as_c_str()
        .ok()
        .and_then(|n| n.to_str().ok())
        .unwrap_or("Unknown")
        .to_string();
    trace!("GPU: {} ({})", name, device_type_name(properties.device_type));

    let missing = missing_features(&features);
    if !missing.is_empty() {
        debug!("GPU '{}' skipped: missing features {:?}", name, missing);
        return None;
    }
    trace!("feature supported: geometryShader");
    trace!("feature supported: samplerAnisotropy");

    if let Some(ext) = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .find(|ext| !has_extension(&extensions, ext))
    {
        debug!("GPU '{}' skipped: missing extension {:?}", name, ext);
        return None;
    }

    let queue_family = find_queue_family(&families, |index| {
        // SAFETY: All handles are valid; a failed query counts as unsupported.
        unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .unwrap_or(false)
        }
    });
    let Some(queue_family) = queue_family else {
        debug!(
            "GPU '{}' skipped: no queue family supports both graphics and present",
            name
        );
        return None;
    };

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_family,
    })
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

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, src) in props.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = *src as std::ffi::c_char;
        }
        props
    }

    #[test]
    fn test_candidate_order_discrete_first() {
        let types = [
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
        ];
        assert_eq!(candidate_order(&types), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_candidate_order_without_discrete() {
        let types = [
            vk::PhysicalDeviceType::VIRTUAL_GPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
        ];
        assert_eq!(candidate_order(&types), vec![0, 1]);
        assert!(candidate_order(&[]).is_empty());
    }

    #[test]
    fn test_missing_features() {
        let none = vk::PhysicalDeviceFeatures::default();
        assert_eq!(
            missing_features(&none),
            vec!["geometryShader", "samplerAnisotropy"]
        );

        let all = vk::PhysicalDeviceFeatures::default()
            .geometry_shader(true)
            .sampler_anisotropy(true);
        assert!(missing_features(&all).is_empty());

        let partial = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);
        assert_eq!(missing_features(&partial), vec!["geometryShader"]);
    }

    #[test]
    fn test_has_extension() {
        let available = [
            extension(c"VK_KHR_maintenance1"),
            extension(ash::khr::swapchain::NAME),
        ];
        assert!(has_extension(&available, ash::khr::swapchain::NAME));
        assert!(!has_extension(&available, c"VK_KHR_dynamic_rendering"));
        assert!(!has_extension(&[], ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_find_queue_family_requires_graphics_and_present() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 0),
            family(vk::QueueFlags::GRAPHICS, 4),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 1),
        ];

        // Family 2 cannot present, so family 3 wins
        assert_eq!(find_queue_family(&families, |i| i != 2), Some(3));
        assert_eq!(find_queue_family(&families, |_| true), Some(2));
        assert_eq!(find_queue_family(&families, |_| false), None);
    }

    #[test]
    fn test_required_extensions_defined() {
        assert_eq!(REQUIRED_DEVICE_EXTENSIONS, &[ash::khr::swapchain::NAME]);
    }
}
