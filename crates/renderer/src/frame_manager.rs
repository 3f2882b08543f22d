//! Frame lifecycle driver.
//!
//! [`FrameDriver`] runs one frame through its fixed sequence of steps and owns
//! the policy around them: which slot is current, when the swapchain is
//! rebuilt, and how many failed frames in a row are tolerated. The GPU side of
//! each step is behind the [`FrameBackend`] trait.
//!
//! # Frame sequence
//!
//! ```text
//! 1. wait_slot        block until the slot's fence is signaled
//! 2. acquire          get a swapchain image; stale -> recreate, retry same slot
//! 3. (image index)    handed to recording and presentation
//! 4. reset_slot       reset the fence and command buffer
//! 5. record           render pass with every live object
//! 6. submit           wait image_available, signal render_finished + fence
//! 7. present          stale or failed -> recreate
//! 8. advance          slot = (slot + 1) % MAX_FRAMES_IN_FLIGHT
//! ```
//!
//! A failure in steps 4 to 6 leaves the slot's fence unsignaled forever, so
//! the slot is recovered before moving on. A failed present leaves
//! render_finished signaled and the image owned by the application, so the
//! swapchain is rebuilt and the slot recovered as well. Swapchain staleness is
//! expected during resizes and never counts as a failure.

use ash::vk;
use tracing::{error, trace, warn};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::error::{RenderError, RenderResult};

/// Result of asking the swapchain for an image.
#[derive(Debug)]
pub enum AcquireOutcome {
    /// Image index ready for rendering
    Acquired(u32),
    /// Swapchain is suboptimal or out of date
    Stale,
    /// Any other failure
    Failed(RenderError),
}

/// Result of handing an image to the presentation engine.
#[derive(Debug)]
pub enum PresentOutcome {
    Presented,
    /// Queued, but the swapchain is suboptimal or out of date
    Stale,
    Failed(RenderError),
}

/// What a call to [`FrameDriver::render`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented
    Presented,
    /// The swapchain was rebuilt instead of drawing; the slot is retried
    SwapchainRecreated,
    /// The frame failed and was dropped
    Failed,
    /// Nothing was drawn because the drawable area is empty
    Skipped,
}

/// Maps a swapchain acquire result onto an [`AcquireOutcome`].
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> AcquireOutcome {
    match result {
        Ok((index, false)) => AcquireOutcome::Acquired(index),
        Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => AcquireOutcome::Stale,
        Err(e) => AcquireOutcome::Failed(RenderError::Rhi(e.into())),
    }
}

/// Maps a present result onto a [`PresentOutcome`].
pub fn classify_present(result: Result<bool, vk::Result>) -> PresentOutcome {
    match result {
        Ok(false) => PresentOutcome::Presented,
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => PresentOutcome::Stale,
        Err(e) => PresentOutcome::Failed(RenderError::Rhi(e.into())),
    }
}

/// GPU side of the frame sequence.
///
/// `slot` is always below [`MAX_FRAMES_IN_FLIGHT`].
pub trait FrameBackend {
    /// Blocks until the slot's previous submission finished.
    fn wait_slot(&mut self, slot: usize) -> RenderResult<()>;

    /// Acquires the next swapchain image, signaling the slot's
    /// image-available semaphore.
    fn acquire(&mut self, slot: usize) -> AcquireOutcome;

    /// Resets the slot's fence and command buffer.
    fn reset_slot(&mut self, slot: usize) -> RenderResult<()>;

    /// Records the frame's draw commands into the slot's command buffer.
    fn record(&mut self, slot: usize, image_index: u32) -> RenderResult<()>;

    /// Submits the slot's command buffer.
    fn submit(&mut self, slot: usize) -> RenderResult<()>;

    /// Queues `image_index` for presentation after rendering finished.
    fn present(&mut self, slot: usize, image_index: u32) -> PresentOutcome;

    /// Rebuilds the swapchain and everything sized by it.
    fn recreate_swapchain(&mut self) -> RenderResult<()>;

    /// Replaces the slot's synchronization objects after a failure.
    fn recover_slot(&mut self, slot: usize) -> RenderResult<()>;
}

/// Owns the current slot index and the failure policy.
#[derive(Debug)]
pub struct FrameDriver {
    current_slot: usize,
    consecutive_failures: u32,
    failure_threshold: u32,
}

impl FrameDriver {
    /// Creates a driver starting at slot 0.
    ///
    /// More than `failure_threshold` failed frames in a row make
    /// [`render`](Self::render) return [`RenderError::TooManyFrameFailures`].
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            current_slot: 0,
            consecutive_failures: 0,
            failure_threshold,
        }
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    #[inline]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Errors from waiting on the slot, rebuilding the swapchain or recovering
    /// a slot are returned directly. Other failures drop the frame and return
    /// `Ok(FrameOutcome::Failed)` until the failure threshold is exceeded.
    pub fn render<B: FrameBackend>(&mut self, backend: &mut B) -> RenderResult<FrameOutcome> {
        let slot = self.current_slot;

        backend.wait_slot(slot)?;

        let image_index = match backend.acquire(slot) {
            AcquireOutcome::Acquired(index) => index,
            AcquireOutcome::Stale => {
                trace!("Swapchain stale on acquire, recreating");
                backend.recreate_swapchain()?;
                // The image-available semaphore may or may not have been signaled
                backend.recover_slot(slot)?;
                return Ok(FrameOutcome::SwapchainRecreated);
            }
            AcquireOutcome::Failed(e) => {
                error!("Failed to acquire swapchain image: {}", e);
                self.advance();
                return self.fail();
            }
        };

        if let Err(e) = self.record_and_submit(backend, slot, image_index) {
            error!("Failed to submit frame on slot {}: {}", slot, e);
            backend.recover_slot(slot)?;
            self.advance();
            return self.fail();
        }

        let outcome = match backend.present(slot, image_index) {
            PresentOutcome::Presented => {
                self.consecutive_failures = 0;
                Ok(FrameOutcome::Presented)
            }
            PresentOutcome::Stale => {
                trace!("Swapchain stale on present, recreating");
                self.consecutive_failures = 0;
                backend.recreate_swapchain()?;
                backend.recover_slot(slot)?;
                Ok(FrameOutcome::Presented)
            }
            PresentOutcome::Failed(e) => {
                error!("Failed to present image {}: {}", image_index, e);
                backend.recreate_swapchain()?;
                backend.recover_slot(slot)?;
                self.advance();
                return self.fail();
            }
        };

        self.advance();
        outcome
    }

    fn record_and_submit<B: FrameBackend>(
        &self,
        backend: &mut B,
        slot: usize,
        image_index: u32,
    ) -> RenderResult<()> {
        backend.reset_slot(slot)?;
        backend.record(slot, image_index)?;
        backend.submit(slot)
    }

    fn advance(&mut self) {
        self.current_slot = (self.current_slot + 1) % MAX_FRAMES_IN_FLIGHT;
    }

    fn fail(&mut self) -> RenderResult<FrameOutcome> {
        self.consecutive_failures += 1;
        if self.consecutive_failures > self.failure_threshold {
            return Err(RenderError::TooManyFrameFailures {
                consecutive: self.consecutive_failures,
                threshold: self.failure_threshold,
            });
        }
        warn!(
            "Dropped frame ({} of {} tolerated in a row)",
            self.consecutive_failures, self.failure_threshold
        );
        Ok(FrameOutcome::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tilegpu_rhi::RhiError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Recreate,
        Recover(usize),
    }

    #[derive(Clone, Copy)]
    enum Acq {
        Ok(u32),
        Stale,
        Fail,
    }

    #[derive(Clone, Copy)]
    enum Pres {
        Ok,
        Stale,
        Fail,
    }

    /// Scripted backend that also simulates GPU completion: a slot stays in
    /// flight from submit until the next wait on it.
    #[derive(Default)]
    struct MockBackend {
        calls: Vec<Call>,
        acquires: VecDeque<Acq>,
        presents: VecDeque<Pres>,
        fail_submit: bool,
        in_flight: [bool; MAX_FRAMES_IN_FLIGHT],
        max_in_flight: usize,
        next_image: u32,
    }

    impl MockBackend {
        fn count(&self, call: &Call) -> usize {
            self.calls.iter().filter(|c| *c == call).count()
        }

        fn submits(&self) -> usize {
            self.calls
                .iter()
                .filter(|c| matches!(c, Call::Submit(_)))
                .count()
        }
    }

    fn vk_failure() -> RenderError {
        RenderError::Rhi(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
    }

    impl FrameBackend for MockBackend {
        fn wait_slot(&mut self, slot: usize) -> RenderResult<()> {
            self.calls.push(Call::Wait(slot));
            self.in_flight[slot] = false;
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> AcquireOutcome {
            self.calls.push(Call::Acquire(slot));
            match self.acquires.pop_front() {
                Some(Acq::Stale) => AcquireOutcome::Stale,
                Some(Acq::Fail) => AcquireOutcome::Failed(vk_failure()),
                Some(Acq::Ok(index)) => AcquireOutcome::Acquired(index),
                None => {
                    let index = self.next_image;
                    self.next_image = (self.next_image + 1) % 3;
                    AcquireOutcome::Acquired(index)
                }
            }
        }

        fn reset_slot(&mut self, slot: usize) -> RenderResult<()> {
            self.calls.push(Call::Reset(slot));
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
            self.calls.push(Call::Record(slot, image_index));
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> RenderResult<()> {
            self.calls.push(Call::Submit(slot));
            if self.fail_submit {
                return Err(vk_failure());
            }
            self.in_flight[slot] = true;
            let count = self.in_flight.iter().filter(|f| **f).count();
            self.max_in_flight = self.max_in_flight.max(count);
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> PresentOutcome {
            self.calls.push(Call::Present(slot, image_index));
            match self.presents.pop_front().unwrap_or(Pres::Ok) {
                Pres::Ok => PresentOutcome::Presented,
                Pres::Stale => PresentOutcome::Stale,
                Pres::Fail => PresentOutcome::Failed(vk_failure()),
            }
        }

        fn recreate_swapchain(&mut self) -> RenderResult<()> {
            self.calls.push(Call::Recreate);
            Ok(())
        }

        fn recover_slot(&mut self, slot: usize) -> RenderResult<()> {
            self.calls.push(Call::Recover(slot));
            self.in_flight[slot] = false;
            Ok(())
        }
    }

    #[test]
    fn test_frame_steps_run_in_order() {
        let mut backend = MockBackend::default();
        backend.acquires.push_back(Acq::Ok(2));
        let mut driver = FrameDriver::new(4);

        let outcome = driver.render(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::Presented);
        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Record(0, 2),
                Call::Submit(0),
                Call::Present(0, 2),
            ]
        );
        assert_eq!(driver.current_slot(), 1);
    }

    #[test]
    fn test_slots_cycle_modulo_frames_in_flight() {
        let mut backend = MockBackend::default();
        let mut driver = FrameDriver::new(4);

        let mut waited = Vec::new();
        for _ in 0..(MAX_FRAMES_IN_FLIGHT * 3) {
            waited.push(driver.current_slot());
            driver.render(&mut backend).unwrap();
        }

        let expected: Vec<usize> = (0..MAX_FRAMES_IN_FLIGHT * 3)
            .map(|i| i % MAX_FRAMES_IN_FLIGHT)
            .collect();
        assert_eq!(waited, expected);
    }

    #[test]
    fn test_never_more_than_frames_in_flight_submissions() {
        let mut backend = MockBackend::default();
        let mut driver = FrameDriver::new(4);

        for _ in 0..20 {
            driver.render(&mut backend).unwrap();
        }

        assert_eq!(backend.submits(), 20);
        assert!(backend.max_in_flight <= MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn test_stale_acquire_recreates_once_and_retries_slot() {
        let mut backend = MockBackend::default();
        backend.acquires.push_back(Acq::Stale);
        let mut driver = FrameDriver::new(4);

        let outcome = driver.render(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::SwapchainRecreated);
        assert_eq!(backend.count(&Call::Recreate), 1);
        assert_eq!(backend.submits(), 0);
        assert_eq!(driver.current_slot(), 0);
        assert_eq!(driver.consecutive_failures(), 0);

        // Next frame proceeds normally on the same slot
        let outcome = driver.render(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::Presented);
        assert_eq!(backend.count(&Call::Recreate), 1);
        assert_eq!(backend.count(&Call::Submit(0)), 1);
    }

    #[test]
    fn test_stale_present_recreates_and_counts_as_success() {
        let mut backend = MockBackend::default();
        backend.presents.push_back(Pres::Stale);
        let mut driver = FrameDriver::new(4);

        let outcome = driver.render(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::Presented);
        assert_eq!(backend.count(&Call::Recreate), 1);
        assert_eq!(driver.current_slot(), 1);
    }

    #[test]
    fn test_failed_acquire_skips_submit_and_advances() {
        let mut backend = MockBackend::default();
        backend.acquires.push_back(Acq::Fail);
        let mut driver = FrameDriver::new(4);

        let outcome = driver.render(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::Failed);
        assert_eq!(backend.submits(), 0);
        assert_eq!(backend.count(&Call::Recreate), 0);
        assert_eq!(driver.current_slot(), 1);
        assert_eq!(driver.consecutive_failures(), 1);
    }

    #[test]
    fn test_failed_submit_recovers_slot() {
        let mut backend = MockBackend {
            fail_submit: true,
            ..Default::default()
        };
        let mut driver = FrameDriver::new(4);

        let outcome = driver.render(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::Failed);
        assert_eq!(backend.count(&Call::Recover(0)), 1);
        assert!(!backend.calls.iter().any(|c| matches!(c, Call::Present(..))));
        assert_eq!(driver.current_slot(), 1);
    }

    #[test]
    fn test_failed_present_recovers_slot_and_releases_image() {
        let mut backend = MockBackend::default();
        backend.presents.push_back(Pres::Fail);
        let mut driver = FrameDriver::new(4);

        let outcome = driver.render(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::Failed);
        assert_eq!(
            &backend.calls[5..],
            &[Call::Present(0, 0), Call::Recreate, Call::Recover(0)]
        );
        assert_eq!(driver.current_slot(), 1);
        assert_eq!(driver.consecutive_failures(), 1);

        // The recovered slot is usable on its next turn
        driver.render(&mut backend).unwrap();
        assert_eq!(driver.render(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(backend.count(&Call::Submit(0)), 2);
        assert_eq!(driver.consecutive_failures(), 0);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut backend = MockBackend::default();
        backend.acquires.extend([Acq::Fail, Acq::Fail]);
        backend.presents.extend([Pres::Ok, Pres::Fail]);
        let mut driver = FrameDriver::new(4);

        driver.render(&mut backend).unwrap();
        driver.render(&mut backend).unwrap();
        assert_eq!(driver.consecutive_failures(), 2);

        assert_eq!(driver.render(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(driver.consecutive_failures(), 0);

        assert_eq!(driver.render(&mut backend).unwrap(), FrameOutcome::Failed);
        assert_eq!(driver.consecutive_failures(), 1);
    }

    #[test]
    fn test_exceeding_failure_threshold_is_fatal() {
        let mut backend = MockBackend::default();
        backend.acquires.extend([Acq::Fail; 4]);
        let mut driver = FrameDriver::new(3);

        for _ in 0..3 {
            assert_eq!(driver.render(&mut backend).unwrap(), FrameOutcome::Failed);
        }
        let err = driver.render(&mut backend).unwrap_err();
        assert!(matches!(
            err,
            RenderError::TooManyFrameFailures {
                consecutive: 4,
                threshold: 3
            }
        ));
    }

    #[test]
    fn test_staleness_never_counts_as_failure() {
        let mut backend = MockBackend::default();
        backend.acquires.extend([Acq::Stale; 10]);
        let mut driver = FrameDriver::new(1);

        for _ in 0..10 {
            assert_eq!(
                driver.render(&mut backend).unwrap(),
                FrameOutcome::SwapchainRecreated
            );
        }
        assert_eq!(driver.consecutive_failures(), 0);
        assert_eq!(backend.count(&Call::Recreate), 10);
    }

    #[test]
    fn test_classify_acquire() {
        assert!(matches!(
            classify_acquire(Ok((1, false))),
            AcquireOutcome::Acquired(1)
        ));
        assert!(matches!(classify_acquire(Ok((1, true))), AcquireOutcome::Stale));
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            AcquireOutcome::Stale
        ));
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            AcquireOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_classify_present() {
        assert!(matches!(classify_present(Ok(false)), PresentOutcome::Presented));
        assert!(matches!(classify_present(Ok(true)), PresentOutcome::Stale));
        assert!(matches!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            PresentOutcome::Stale
        ));
        assert!(matches!(
            classify_present(Err(vk::Result::ERROR_DEVICE_LOST)),
            PresentOutcome::Failed(_)
        ));
    }
}
