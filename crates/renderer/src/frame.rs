//! Per-slot frame resources.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on in_flight (host waits for the previous use of this slot)
//! 2. Acquire swapchain image (signals image_available)
//! 3. Reset in_flight and the command buffer, then record
//! 4. Submit:
//!    - Wait on image_available at the color-attachment-output stage
//!    - Signal render_finished
//!    - Signal in_flight
//! 5. Present (waits on render_finished)
//! ```

use std::sync::Arc;

use tracing::debug;

use tilegpu_rhi::{RhiError, RhiResult};
use tilegpu_rhi::command::{CommandBuffer, CommandPool};
use tilegpu_rhi::device::Device;
use tilegpu_rhi::sync::{Fence, Semaphore};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::error::RenderResult;

/// Resources owned by one frame-in-flight slot.
pub struct FrameSlot {
    /// Signaled when the acquired swapchain image is ready to be drawn to.
    image_available: Semaphore,
    /// Signaled when rendering finished and the image may be presented.
    render_finished: Semaphore,
    /// Signaled when the slot's last submission finished on the GPU.
    in_flight: Fence,
    command_buffer: CommandBuffer,
}

impl FrameSlot {
    fn new(device: &Arc<Device>, command_pool: &CommandPool) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            // Signaled so the first wait returns immediately
            in_flight: Fence::new(device.clone(), true)?,
            command_buffer: CommandBuffer::new(command_pool)?,
        })
    }

    /// Replaces both semaphores and the fence with fresh ones.
    ///
    /// Used after a failure left their signal state unknown. The device must
    /// be idle. The new fence starts signaled so the next wait on this slot
    /// does not block forever.
    pub fn recover(&mut self, device: &Arc<Device>) -> RhiResult<()> {
        self.image_available = Semaphore::new(device.clone())?;
        self.render_finished = Semaphore::new(device.clone())?;
        self.in_flight = Fence::new(device.clone(), true)?;
        debug!("Frame slot synchronization recreated");
        Ok(())
    }

    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }
}

/// The fixed set of frame slots, one per frame in flight.
pub struct FrameSlots {
    slots: [FrameSlot; MAX_FRAMES_IN_FLIGHT],
}

impl FrameSlots {
    /// Creates every slot. Command buffers come from `command_pool`, which
    /// must outlive the slots.
    pub fn new(device: &Arc<Device>, command_pool: &CommandPool) -> RenderResult<Self> {
        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            slots.push(FrameSlot::new(device, command_pool)?);
        }
        let slots: [FrameSlot; MAX_FRAMES_IN_FLIGHT] = slots.try_into().map_err(|_| {
            RhiError::InvalidHandle("frame slot count mismatch".to_string())
        })?;

        debug!("Created {} frame slots", MAX_FRAMES_IN_FLIGHT);
        Ok(Self { slots })
    }

    #[inline]
    pub fn get(&self, slot: usize) -> &FrameSlot {
        &self.slots[slot]
    }

    #[inline]
    pub fn get_mut(&mut self, slot: usize) -> &mut FrameSlot {
        &mut self.slots[slot]
    }
}
