use std::time::{Duration, Instant};

pub const BITRATE_WINDOW: Duration = Duration::from_secs(1);

/// Rolling byte count turned into bits per second once per window.
#[derive(Debug, Default)]
pub struct BitrateWindow {
    bytes: u64,
    window_start: Option<Instant>,
    bits_per_second: u64,
}

impl BitrateWindow {
    /// Starts a fresh window; the estimate reads zero until it elapses.
    pub fn reset(&mut self, now: Instant) {
        self.bytes = 0;
        self.bits_per_second = 0;
        self.window_start = Some(now);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Adds `bytes` and returns the new estimate when a window has completed.
    pub fn record(&mut self, bytes: usize, now: Instant) -> Option<u64> {
        self.bytes += bytes as u64;
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return None;
        };
        let elapsed = now.saturating_duration_since(start);
        if elapsed < BITRATE_WINDOW {
            return None;
        }
        let elapsed_ms = elapsed.as_millis().max(1) as u64;
        self.bits_per_second = self.bytes * 8 * 1000 / elapsed_ms;
        self.bytes = 0;
        self.window_start = Some(now);
        Some(self.bits_per_second)
    }

    pub fn bits_per_second(&self) -> u64 {
        self.bits_per_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_zero_until_a_window_completes() {
        let start = Instant::now();
        let mut window = BitrateWindow::default();
        window.reset(start);
        assert_eq!(window.bits_per_second(), 0);

        assert_eq!(window.record(1000, start + Duration::from_millis(500)), None);
        assert_eq!(window.bits_per_second(), 0);
    }

    #[test]
    fn estimate_covers_the_whole_window() {
        let start = Instant::now();
        let mut window = BitrateWindow::default();
        window.reset(start);

        window.record(50_000, start + Duration::from_millis(400));
        let bps = window.record(75_000, start + Duration::from_millis(1000));
        assert_eq!(bps, Some(1_000_000));

        // next window starts empty
        let bps = window.record(25_000, start + Duration::from_millis(3000));
        assert_eq!(bps, Some(100_000));
    }

    #[test]
    fn first_record_without_reset_starts_the_window() {
        let start = Instant::now();
        let mut window = BitrateWindow::default();
        assert_eq!(window.record(500, start), None);
        assert_eq!(window.record(0, start + Duration::from_secs(1)), Some(4000));
    }

    #[test]
    fn clear_zeroes_the_estimate() {
        let start = Instant::now();
        let mut window = BitrateWindow::default();
        window.reset(start);
        window.record(10_000, start + Duration::from_secs(2));
        assert!(window.bits_per_second() > 0);
        window.clear();
        assert_eq!(window.bits_per_second(), 0);
    }
}
