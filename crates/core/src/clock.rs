//! Monotonic clock for queue timestamps
//!
//! Queue timestamps must come from a monotonic source; wall-clock can jump
//! and is only used for log/file metadata. Timestamps are microseconds since
//! the clock's epoch, so they are totally ordered `u64`s and cheap to compare.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Convert seconds (as used in configuration) to clock microseconds.
pub fn secs_to_micros(secs: f64) -> u64 {
    if secs <= 0.0 {
        0
    } else {
        (secs * 1_000_000.0) as u64
    }
}

/// Convert clock microseconds to seconds.
pub fn micros_to_secs(micros: u64) -> f64 {
    micros as f64 / 1_000_000.0
}

/// Monotonic microsecond clock shared by the queue, coordinator, and timers.
///
/// The manual variant exists for deterministic tests: time only moves when a
/// test calls [`Clock::advance_micros`].
#[derive(Clone)]
pub struct Clock(Arc<ClockInner>);

enum ClockInner {
    Monotonic(Instant),
    Manual(AtomicU64),
}

impl Clock {
    /// Create a monotonic clock anchored at the current instant.
    pub fn monotonic() -> Self {
        Clock(Arc::new(ClockInner::Monotonic(Instant::now())))
    }

    /// Create a manually-driven clock starting at `start_micros`.
    pub fn manual(start_micros: u64) -> Self {
        Clock(Arc::new(ClockInner::Manual(AtomicU64::new(start_micros))))
    }

    /// Current time in microseconds since the clock epoch.
    pub fn now_micros(&self) -> u64 {
        match &*self.0 {
            ClockInner::Monotonic(epoch) => epoch.elapsed().as_micros() as u64,
            ClockInner::Manual(now) => now.load(Ordering::SeqCst),
        }
    }

    /// Advance a manual clock. No-op on a monotonic clock.
    pub fn advance_micros(&self, micros: u64) {
        if let ClockInner::Manual(now) = &*self.0 {
            now.fetch_add(micros, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.0 {
            ClockInner::Monotonic(_) => write!(f, "Clock::Monotonic({}us)", self.now_micros()),
            ClockInner::Manual(_) => write!(f, "Clock::Manual({}us)", self.now_micros()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = Clock::monotonic();
        let a = clock.now_micros();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = clock.now_micros();
        assert!(b > a);
    }

    #[test]
    fn test_manual_clock_only_moves_on_advance() {
        let clock = Clock::manual(1_000);
        assert_eq!(clock.now_micros(), 1_000);
        assert_eq!(clock.now_micros(), 1_000);
        clock.advance_micros(500);
        assert_eq!(clock.now_micros(), 1_500);
    }

    #[test]
    fn test_secs_micros_round_trip() {
        assert_eq!(secs_to_micros(0.1), 100_000);
        assert_eq!(secs_to_micros(-1.0), 0);
        assert!((micros_to_secs(2_500_000) - 2.5).abs() < 1e-9);
    }
}
