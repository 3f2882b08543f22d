//! GPU buffers and the staging upload path.
//!
//! - [`BufferUsage`] names what a buffer is for and which memory it wants.
//! - [`find_memory_type`] is the explicit memory-type search every allocation
//!   is checked against before it is made. gpu-allocator then picks the
//!   concrete type from a [`MemoryLocation`], and [`verify_memory_flags`]
//!   rejects its choice if it lacks any requested property.
//! - [`Buffer`] owns a VkBuffer plus its gpu-allocator allocation and
//!   releases both, buffer first, when dropped.
//!
//! Device-local buffers are filled through a host-visible staging buffer and
//! a one-shot copy ([`Buffer::upload`]). The staging buffer lives only for the
//! duration of that call.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tilegpu_rhi::buffer::{Buffer, BufferUsage};
//! use tilegpu_rhi::command::CommandPool;
//! use tilegpu_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), tilegpu_rhi::RhiError> {
//! let indices: [u16; 6] = [0, 1, 2, 2, 3, 0];
//! let index_buffer = Buffer::from_data(device, pool, BufferUsage::Index, bytemuck::cast_slice(&indices))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, trace};

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local vertex data
    Vertex,
    /// Device-local index data
    Index,
    /// Host-visible source of a staging copy
    Staging,
    /// Host-visible destination for reading data back
    Readback,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    ///
    /// Vertex and index buffers are also transfer sources so their contents
    /// can be read back.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::Readback => vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    /// Memory properties this usage asks for by default.
    pub fn memory_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            BufferUsage::Staging | BufferUsage::Readback => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Staging => "staging",
            BufferUsage::Readback => "readback",
        }
    }
}

/// Allocator location matching the requested memory properties.
pub fn memory_location(usage: BufferUsage, flags: vk::MemoryPropertyFlags) -> MemoryLocation {
    if !flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        MemoryLocation::GpuOnly
    } else if usage == BufferUsage::Readback {
        MemoryLocation::GpuToCpu
    } else {
        MemoryLocation::CpuToGpu
    }
}

/// Finds the first memory type allowed by `type_bits` whose properties
/// include every flag in `flags`.
///
/// # Errors
///
/// Returns [`RhiError::NoCompatibleMemory`] when nothing matches. There is
/// no fallback type.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> RhiResult<u32> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .enumerate()
        .find(|(index, memory_type)| {
            type_bits & (1 << index) != 0 && memory_type.property_flags.contains(flags)
        })
        .map(|(index, _)| index as u32)
        .ok_or(RhiError::NoCompatibleMemory { type_bits, flags })
}

/// Checks that memory picked by the allocator has every flag in `flags`.
///
/// # Errors
///
/// Returns [`RhiError::NoCompatibleMemory`] when a requested property is
/// missing from `actual`.
pub fn verify_memory_flags(
    actual: vk::MemoryPropertyFlags,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> RhiResult<()> {
    if actual.contains(flags) {
        Ok(())
    } else {
        debug!(
            "Allocator chose memory {:?}, missing requested {:?}",
            actual,
            flags & !actual
        );
        Err(RhiError::NoCompatibleMemory { type_bits, flags })
    }
}

/// GPU buffer with allocator-managed memory.
///
/// # Thread Safety
///
/// The buffer itself is not synchronized. Callers must not drop it while
/// queued GPU work may still reference it.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a buffer with the default memory properties for `usage`.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        Self::with_memory_flags(device, usage, size, usage.memory_flags())
    }

    /// Creates a buffer backed by memory with at least `flags`.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero, no memory type satisfies `flags`,
    /// or buffer creation, allocation or binding fails. Nothing is leaked on
    /// any of these paths.
    pub fn with_memory_flags(
        device: Arc<Device>,
        usage: BufferUsage,
        size: vk::DeviceSize,
        flags: vk::MemoryPropertyFlags,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        // SAFETY: The device is alive and buffer_info is valid.
        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        // From here on Drop releases whatever exists.
        let mut this = Self {
            device,
            buffer,
            allocation: None,
            size,
            usage,
        };

        // SAFETY: The buffer was just created on this device.
        let requirements = unsafe { this.device.handle().get_buffer_memory_requirements(buffer) };
        find_memory_type(
            this.device.memory_properties(),
            requirements.memory_type_bits,
            flags,
        )?;

        let allocation = this.device.lock_allocator()?.allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location: memory_location(usage, flags),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        // SAFETY: The memory handle is only used to bind this allocation.
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        let actual = allocation.memory_properties();
        this.allocation = Some(allocation);
        verify_memory_flags(actual, requirements.memory_type_bits, flags)?;

        // SAFETY: The allocation satisfies the buffer's requirements.
        unsafe {
            this.device
                .handle()
                .bind_buffer_memory(buffer, memory, offset)?;
        }

        trace!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(this)
    }

    /// Creates a device-local buffer and fills it through a staging upload.
    pub fn from_data(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.upload(pool, data)?;
        Ok(buffer)
    }

    /// Copies `data` into the start of this buffer via a staging buffer.
    ///
    /// Blocks until the copy has completed on the GPU. The staging buffer is
    /// released before returning, on success or failure.
    pub fn upload(&self, pool: &CommandPool, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.check_range(data.len())?;

        let staging = Self::new(
            self.device.clone(),
            BufferUsage::Staging,
            data.len() as vk::DeviceSize,
        )?;
        staging.write_mapped(data)?;

        let region = vk::BufferCopy::default().size(data.len() as vk::DeviceSize);
        pool.one_shot(|cmd| {
            cmd.copy_buffer(staging.handle(), self.buffer, &[region]);
            Ok(())
        })?;

        debug!("Uploaded {} bytes to {} buffer", data.len(), self.usage.name());
        Ok(())
    }

    /// Copies the whole buffer into a host-visible buffer and returns its bytes.
    ///
    /// Intended for debugging and tests.
    pub fn read_back(&self, pool: &CommandPool) -> RhiResult<Vec<u8>> {
        let readback = Self::new(self.device.clone(), BufferUsage::Readback, self.size)?;

        let region = vk::BufferCopy::default().size(self.size);
        pool.one_shot(|cmd| {
            cmd.copy_buffer(self.buffer, readback.handle(), &[region]);
            Ok(())
        })?;

        readback.read_mapped()
    }

    /// Writes `data` to the start of a host-visible buffer.
    pub fn write_mapped(&self, data: &[u8]) -> RhiResult<()> {
        self.check_range(data.len())?;
        let dst = self.mapped_ptr()?;

        // SAFETY: The mapping covers `size` bytes and data.len() <= size.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Reads the whole contents of a host-visible buffer.
    pub fn read_mapped(&self) -> RhiResult<Vec<u8>> {
        let src = self.mapped_ptr()?;
        let mut out = vec![0u8; self.size as usize];

        // SAFETY: The mapping covers `size` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, out.as_mut_ptr(), out.len());
        }

        Ok(out)
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn check_range(&self, len: usize) -> RhiResult<()> {
        if len as vk::DeviceSize > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write of {} bytes exceeds {} buffer of {} bytes",
                len,
                self.usage.name(),
                self.size
            )));
        }
        Ok(())
    }

    fn mapped_ptr(&self) -> RhiResult<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .map(|ptr| ptr.as_ptr() as *mut u8)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("{} buffer memory is not mapped", self.usage.name()))
            })
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // SAFETY: Owners drop buffers only after the GPU is done with them.
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        tracing::error!("Failed to free buffer allocation: {:?}", e);
                    }
                }
                Err(e) => tracing::error!("Leaking buffer allocation: {}", e),
            }
        }

        trace!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        props
    }

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER)
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
        assert_eq!(
            BufferUsage::Readback.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_DST
        );
    }

    #[test]
    fn test_memory_location() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(
            memory_location(BufferUsage::Vertex, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            memory_location(BufferUsage::Staging, host),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            memory_location(BufferUsage::Readback, host),
            MemoryLocation::GpuToCpu
        );
    }

    #[test]
    fn test_find_memory_type_first_match() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(),
            1
        );
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn test_find_memory_type_respects_type_bits() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        // Only type 1 is allowed by the requirement mask
        assert_eq!(
            find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(),
            1
        );
    }

    #[test]
    fn test_find_memory_type_superset_required() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);
        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        match find_memory_type(&props, 0b1, wanted) {
            Err(RhiError::NoCompatibleMemory { type_bits, flags }) => {
                assert_eq!(type_bits, 0b1);
                assert_eq!(flags, wanted);
            }
            other => panic!("expected NoCompatibleMemory, got {other:?}"),
        }
    }

    #[test]
    fn test_find_memory_type_ignores_unreported_types() {
        let mut props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        // Garbage beyond memory_type_count must not be considered
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;

        assert!(find_memory_type(&props, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }

    #[test]
    fn test_verify_memory_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert!(verify_memory_flags(host, 0b1, host).is_ok());
        assert!(
            verify_memory_flags(
                host | vk::MemoryPropertyFlags::DEVICE_LOCAL,
                0b1,
                vk::MemoryPropertyFlags::DEVICE_LOCAL
            )
            .is_ok()
        );

        // Allocator fell back to a type without the cached bit
        let wanted = host | vk::MemoryPropertyFlags::HOST_CACHED;
        assert!(matches!(
            verify_memory_flags(host, 0b110, wanted),
            Err(RhiError::NoCompatibleMemory { type_bits: 0b110, flags }) if flags == wanted
        ));
    }

    #[test]
    fn test_buffer_usage_name() {
        assert_eq!(BufferUsage::Vertex.name(), "vertex");
        assert_eq!(BufferUsage::Index.name(), "index");
        assert_eq!(BufferUsage::Staging.name(), "staging");
        assert_eq!(BufferUsage::Readback.name(), "readback");
    }
}
