//! Time sources.
//!
//! Every time-dependent component takes an `Arc<dyn Clock>` instead of reading
//! the system clock directly. Production wiring uses [`SystemClock`]; tests and
//! simulations drive a [`ManualClock`].
//!
//! Time is expressed as a `Duration` since the Unix epoch because rate-limit
//! bucket timestamps are shared between processes through the store and must
//! be comparable across them.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of wall-clock time.
pub trait Clock: Send + Sync + Debug {
    /// Current time as a duration since the Unix epoch.
    fn now(&self) -> Duration;

    /// Current time in fractional seconds since the Unix epoch.
    fn now_secs_f64(&self) -> f64 {
        self.now().as_secs_f64()
    }
}

/// The operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start` since the epoch.
    pub fn new(start: Duration) -> Self {
        Self {
            micros: AtomicU64::new(start.as_micros() as u64),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.micros.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: Duration) {
        self.micros.store(to.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(Duration::from_secs(1_000));
        assert_eq!(clock.now(), Duration::from_secs(1_000));

        clock.advance(Duration::from_millis(1_500));
        assert_eq!(clock.now_secs_f64(), 1_001.5);

        clock.set(Duration::from_secs(5));
        assert_eq!(clock.now(), Duration::from_secs(5));
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.now() > Duration::from_secs(1_600_000_000));
    }
}
