//! Frame-rate and timestamp pacing against the wall clock.

use std::time::{Duration, Instant};

use ffmpeg_next::Rational;
use ffmpeg_next::util::mathematics::{Rescale, Rounding, rescale::TIME_BASE};

use crate::stream::frame_rate_or_default;

/// Interval to sleep after each processed unit when pacing by frame rate.
pub fn frame_interval(frame_rate: f64) -> Duration {
    let fps = if frame_rate.is_finite() && frame_rate > 0.0 {
        frame_rate
    } else {
        frame_rate_or_default(Rational(0, 1))
    };
    Duration::from_millis((1000.0 / fps) as u64)
}

/// Maps unit timestamps onto wall-clock time measured from the start of a pass.
#[derive(Debug, Clone, Copy)]
pub struct PaceClock {
    anchor: Instant,
}

impl PaceClock {
    pub fn start() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(anchor: Instant) -> Self {
        Self { anchor }
    }

    /// Moves the anchor forward, so time spent paused is not made up in a burst.
    pub fn shift(&mut self, by: Duration) {
        self.anchor += by;
    }

    /// How long to wait before a unit stamped `ts` is due. Never negative.
    pub fn delay_for(&self, ts: i64, time_base: Rational, now: Instant) -> Duration {
        if ts == i64::MIN || ts == i64::MAX || time_base.denominator() == 0 {
            return Duration::ZERO;
        }
        let due_us = ts.rescale_with(time_base, TIME_BASE, Rounding::NearInfinity);
        if due_us <= 0 {
            return Duration::ZERO;
        }
        let due = Duration::from_micros(due_us as u64);
        due.saturating_sub(now.saturating_duration_since(self.anchor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_interval_truncates_to_millis() {
        assert_eq!(frame_interval(25.0), Duration::from_millis(40));
        assert_eq!(frame_interval(29.97), Duration::from_millis(33));
        assert_eq!(frame_interval(0.0), Duration::from_millis(33));
        assert_eq!(frame_interval(f64::NAN), Duration::from_millis(33));
    }

    #[test]
    fn pace_clock_waits_only_when_ahead() {
        let anchor = Instant::now();
        let clock = PaceClock::starting_at(anchor);
        let tb = Rational(1, 1000);

        let ahead = clock.delay_for(500, tb, anchor + Duration::from_millis(200));
        assert_eq!(ahead, Duration::from_millis(300));

        let behind = clock.delay_for(100, tb, anchor + Duration::from_millis(200));
        assert_eq!(behind, Duration::ZERO);

        assert_eq!(clock.delay_for(-40, tb, anchor), Duration::ZERO);
        assert_eq!(clock.delay_for(i64::MIN, tb, anchor), Duration::ZERO);
        assert_eq!(
            clock.delay_for(1, Rational(1, 30), anchor),
            Duration::from_micros(33_333)
        );
    }

    #[test]
    fn shifted_clock_absorbs_paused_time() {
        let anchor = Instant::now();
        let mut clock = PaceClock::starting_at(anchor);
        let tb = Rational(1, 1000);
        let now = anchor + Duration::from_millis(400);
        assert_eq!(clock.delay_for(100, tb, now), Duration::ZERO);

        clock.shift(Duration::from_millis(300));
        assert_eq!(clock.delay_for(100, tb, now), Duration::ZERO);
        assert_eq!(clock.delay_for(150, tb, now), Duration::from_millis(50));
    }
}
