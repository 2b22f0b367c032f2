//! Time management utilities

use std::time::{Duration, Instant};

/// Fixed-interval frame pacer for render loops
///
/// Every call to [`FramePacer::wait`] sleeps for the same interval. There is no
/// adaptive catch-up: a slow frame simply makes that iteration longer.
pub struct FramePacer {
    interval: Duration,
    started: Instant,
    frame_count: u64,
}

impl FramePacer {
    /// Create a pacer that sleeps `interval` between frames
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: Instant::now(),
            frame_count: 0,
        }
    }

    /// Sleep for one frame interval and count the frame
    pub fn wait(&mut self) {
        self.frame_count += 1;
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }
    }

    /// The fixed sleep interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of completed frames
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Total time since the pacer was created
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Average frames per second since creation
    pub fn average_fps(&self) -> f32 {
        let secs = self.elapsed().as_secs_f32();
        if secs > 0.0 {
            #[allow(clippy::cast_precision_loss)]
            let frames = self.frame_count as f32;
            frames / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_pacer_counts_frames() {
        let mut pacer = FramePacer::new(Duration::ZERO);
        for _ in 0..5 {
            pacer.wait();
        }
        assert_eq!(pacer.frame_count(), 5);
        assert_eq!(pacer.interval(), Duration::ZERO);
    }

    #[test]
    fn test_frame_pacer_sleeps_interval() {
        let mut pacer = FramePacer::new(Duration::from_millis(5));
        let start = Instant::now();
        pacer.wait();
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
