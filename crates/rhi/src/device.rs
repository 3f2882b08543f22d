//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, retrieval of the single
//! graphics-and-present queue, and gpu-allocator initialization.
//!
//! # Example
//!
//! ```no_run
//! use tilegpu_rhi::instance::Instance;
//! use tilegpu_rhi::physical_device::select_device;
//! use tilegpu_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new(c"demo", false, &[]).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let candidates = select_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//! let device = Device::new(&instance, &candidates[0]).expect("Failed to create logical device");
//! let queue = device.queue();
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, REQUIRED_DEVICE_EXTENSIONS};

/// Vulkan logical device wrapper.
///
/// Owns the logical device, the single queue used for graphics and
/// presentation, and the memory allocator. Immutable after creation.
///
/// # Thread Safety
///
/// The [`Device`] is shared through `Arc`. The allocator is protected by a
/// `Mutex`.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Dropped by hand before the logical device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    queue: vk::Queue,
    queue_family: u32,
}

impl Device {
    /// Creates a new logical device on `physical_device_info`.
    ///
    /// Enables the swapchain extension and the geometry shader and sampler
    /// anisotropy features, retrieves queue 0 of the chosen family, and
    /// initializes the allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator initialization fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> RhiResult<Arc<Self>> {
        let queue_family = physical_device_info.queue_family;
        let queue_priorities = [1.0f32];

        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)];

        let features = vk::PhysicalDeviceFeatures::default()
            .geometry_shader(true)
            .sampler_anisotropy(true);

        let extension_names: Vec<*const std::ffi::c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        // SAFETY: The physical device belongs to this instance and create_info
        // only borrows locals that outlive the call.
        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created on '{}'",
            physical_device_info.device_name()
        );

        // SAFETY: Exactly one queue was requested from this family.
        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        debug!("Queue retrieved from family {}", queue_family);

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                // SAFETY: Nothing has been created from the device yet.
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            memory_properties: physical_device_info.memory_properties,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queue,
            queue_family,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Memory types and heaps of the physical device.
    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// The queue used for graphics, transfer and presentation.
    #[inline]
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Family index of [`Device::queue`].
    #[inline]
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Locks the memory allocator.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::AllocatorPoisoned`] if a previous holder panicked.
    pub fn lock_allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::AllocatorPoisoned)
    }

    /// Blocks until all queued work on the device has finished.
    pub fn wait_idle(&self) -> RhiResult<()> {
        // SAFETY: The device is alive; the call has no other preconditions.
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers to the queue.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are valid and fully recorded
    /// - Semaphores and the fence referenced by `submit_infos` are not in use
    pub unsafe fn submit(&self, submit_infos: &[vk::SubmitInfo], fence: vk::Fence) -> RhiResult<()> {
        unsafe {
            self.device.queue_submit(self.queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            tracing::error!("Failed to wait for device idle during drop: {:?}", e);
        }

        // SAFETY: The allocator is dropped exactly once, here, while the device
        // it frees memory from is still alive.
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device and the vk handles are Send+Sync
// - Allocator is protected by Mutex
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
