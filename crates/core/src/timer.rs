//! Frame timer used for periodic FPS reporting.

use std::time::{Duration, Instant};

/// Counts frames and reports an average rate once per interval.
#[derive(Debug)]
pub struct FrameTimer {
    interval: Duration,
    window_start: Instant,
    frames: u32,
    total_frames: u64,
}

impl FrameTimer {
    /// Create a timer that reports every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window_start: Instant::now(),
            frames: 0,
            total_frames: 0,
        }
    }

    /// Total number of frames recorded since creation.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Record one presented frame.
    ///
    /// Returns the average frames per second once `interval` has elapsed since the
    /// last report, and starts a new window.
    pub fn frame(&mut self) -> Option<f64> {
        self.frame_at(Instant::now())
    }

    fn frame_at(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        self.total_frames += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let fps = f64::from(self.frames) / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_report_before_interval() {
        let mut timer = FrameTimer::new(Duration::from_secs(3600));
        assert!(timer.frame().is_none());
        assert!(timer.frame().is_none());
        assert_eq!(timer.total_frames(), 2);
    }

    #[test]
    fn test_report_after_interval() {
        let mut timer = FrameTimer::new(Duration::from_secs(1));
        let start = timer.window_start;
        for _ in 0..59 {
            assert!(timer.frame_at(start).is_none());
        }
        let fps = timer.frame_at(start + Duration::from_secs(2)).unwrap();
        assert!((fps - 30.0).abs() < 1e-9);

        // New window starts empty
        assert!(timer.frame_at(start + Duration::from_secs(2)).is_none());
        assert_eq!(timer.total_frames(), 61);
    }
}
