//! Clock Abstraction for Deterministic Waits
//!
//! The poll loop reads time and sleeps only through [`Clock`], so tests can
//! replace wall-clock time with a [`FakeClock`] that advances instantly.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source used by the poller
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Real time, measured from construction
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is now
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Shared system clock
#[must_use]
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock::new())
}

/// Virtual clock: `sleep` advances time without blocking
///
/// Clones share the same timeline, so a [`crate::driver::MockSession`] and a
/// poller built from the same fake clock observe identical time.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    now_nanos: Arc<AtomicU64>,
    sleeps: Arc<AtomicU64>,
}

impl FakeClock {
    /// Create a fake clock at t=0
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without counting a sleep
    pub fn advance(&self, duration: Duration) {
        self.now_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Number of `sleep` calls observed
    #[must_use]
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }

    /// Share this clock as a trait object
    #[must_use]
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(duration);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod fake_clock_tests {
        use super::*;

        #[test]
        fn test_starts_at_zero() {
            let clock = FakeClock::new();
            assert_eq!(clock.now(), Duration::ZERO);
            assert_eq!(clock.sleep_count(), 0);
        }

        #[test]
        fn test_sleep_advances_and_counts() {
            let clock = FakeClock::new();
            clock.sleep(Duration::from_millis(500));
            clock.sleep(Duration::from_millis(250));
            assert_eq!(clock.now(), Duration::from_millis(750));
            assert_eq!(clock.sleep_count(), 2);
        }

        #[test]
        fn test_clones_share_timeline() {
            let clock = FakeClock::new();
            let shared = clock.shared();
            clock.advance(Duration::from_secs(3));
            assert_eq!(shared.now(), Duration::from_secs(3));
            assert_eq!(clock.sleep_count(), 0);
        }
    }

    mod system_clock_tests {
        use super::*;

        #[test]
        fn test_monotonic() {
            let clock = SystemClock::new();
            let a = clock.now();
            clock.sleep(Duration::from_millis(2));
            assert!(clock.now() > a);
        }
    }
}
