//! Frame timing.

use std::time::{Duration, Instant};

use tracing::trace;

/// Counts presented frames and reports the frame rate once per interval.
#[derive(Debug)]
pub struct FrameTimer {
    window_start: Instant,
    frames: u32,
    interval: Duration,
}

impl FrameTimer {
    /// Create a timer reporting once per second.
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(1))
    }

    /// Create a timer reporting once per `interval`.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            interval,
        }
    }

    /// Record one frame.
    ///
    /// Returns the frame rate when a reporting interval has just elapsed.
    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let fps = f64::from(self.frames) / elapsed.as_secs_f64();
        trace!("{} frames in {:.3}s ({:.1} fps)", self.frames, elapsed.as_secs_f64(), fps);

        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }

    /// Restart the current reporting window.
    pub fn reset(&mut self) {
        self.window_start = Instant::now();
        self.frames = 0;
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
