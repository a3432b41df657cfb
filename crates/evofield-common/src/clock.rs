//! Time sources
//!
//! Rate limiting, debouncing and checkpoint naming read time through [`Clock`]
//! so tests can advance time deterministically instead of sleeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic plus wall-clock time source
pub trait Clock: Send + Sync {
    /// Monotonic time elapsed since the clock's origin
    fn elapsed(&self) -> Duration;

    /// Wall-clock seconds since the Unix epoch
    fn unix_seconds(&self) -> i64;
}

/// Clock backed by [`Instant`] and the system wall clock
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
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
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn unix_seconds(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Manually driven clock
///
/// Clones share the same underlying time, so a test can hand one clone to the
/// component under test and advance the other.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
    unix_base: i64,
}

impl ManualClock {
    /// Start at zero elapsed time, anchored at `unix_base` seconds
    pub fn new(unix_base: i64) -> Self {
        Self {
            now: Arc::new(Mutex::new(Duration::ZERO)),
            unix_base,
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Jump to an absolute elapsed time; never moves backwards
    pub fn set(&self, to: Duration) {
        let mut now = self.now.lock();
        if to > *now {
            *now = to;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_700_000_000)
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        *self.now.lock()
    }

    fn unix_seconds(&self) -> i64 {
        self.unix_base + self.now.lock().as_secs() as i64
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(100);
        let observer = clock.clone();

        clock.advance(Duration::from_secs(5));
        assert_eq!(observer.elapsed(), Duration::from_secs(5));
        assert_eq!(observer.unix_seconds(), 105);
    }

    #[test]
    fn test_manual_clock_never_rewinds() {
        let clock = ManualClock::default();
        clock.set(Duration::from_secs(10));
        clock.set(Duration::from_secs(3));
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.elapsed();
        let b = clock.elapsed();
        assert!(b >= a);
        assert!(clock.unix_seconds() > 0);
    }
}
