/**
 * ============================================================================
 * CLOCK BASELINE MODULE
 * ============================================================================
 *
 * PURPOSE: Shared zero-time reference for one session
 *
 * The video producer marks the baseline (through the PauseCoordinator, which
 * also owns the start gate). The audio producer waits for it before opening
 * its device so both producers measure timestamps against the same instant.
 *
 * ============================================================================
 */

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockBaseline {
    origin: Instant,
}

impl ClockBaseline {
    pub fn at(origin: Instant) -> Self {
        Self { origin }
    }

    // Raw wall-clock seconds since baseline
    pub fn elapsed_at(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.origin).as_secs_f64()
    }

    // Logical timestamp: elapsed minus accumulated pause time
    pub fn timestamp_at(&self, now: Instant, paused: Duration) -> f64 {
        self.elapsed_at(now) - paused.as_secs_f64()
    }

    // Scheduled instant of tick `n` for a fixed frame duration
    pub fn tick(&self, n: u64, frame: Duration, paused: Duration) -> Instant {
        self.origin + frame.mul_f64(n as f64) + paused
    }
}
