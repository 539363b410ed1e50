//! Millisecond clock sources.
//!
//! The client reads time only through the [`Clock`] capability. Expiry
//! timestamps and receive times are relative milliseconds from whatever
//! origin the clock chooses; only ordering between readings of the same
//! clock is meaningful.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::{Error, Result};

/// A monotonically non-decreasing millisecond counter.
pub trait Clock: Send {
    /// Current reading in milliseconds.
    ///
    /// An `Err` means the clock is temporarily unavailable. Callers decide
    /// whether that is fatal for the operation at hand.
    fn now_ms(&self) -> Result<u64>;
}

/// Factory used by the client to acquire its own clock handle at creation.
pub type ClockFactory = Arc<dyn Fn() -> Result<Box<dyn Clock>> + Send + Sync>;

/// Default clock factory producing a [`MonotonicClock`].
pub fn monotonic_clock_factory() -> ClockFactory {
    // ---
    Arc::new(|| -> Result<Box<dyn Clock>> { Ok(Box::new(MonotonicClock::new())) })
}

/// Clock backed by [`Instant`], counting from its own creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> Result<u64> {
        // ---
        u64::try_from(self.origin.elapsed().as_millis())
            .map_err(|_| Error::Clock("millisecond counter overflow".into()))
    }
}

/// Manually driven clock.
///
/// Clones share the same reading, so a test can keep one handle and hand
/// another to the client through [`ManualClock::factory`]. The clock can
/// also be switched to an unavailable state to exercise failure paths.
///
/// # ⚠️  Testing Only
///
/// Production code should use the default monotonic clock.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl ManualClock {
    /// Create a clock reading `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        // ---
        let clock = Self::default();
        clock.set(start_ms);
        clock
    }

    /// Set the current reading.
    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Move the reading forward by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        // ---
        let now = self.now.load(Ordering::SeqCst);
        self.now.store(now.saturating_add(delta_ms), Ordering::SeqCst);
    }

    /// Make subsequent reads fail (`true`) or succeed again (`false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Factory handing out clones of this clock.
    pub fn factory(&self) -> ClockFactory {
        // ---
        let clock = self.clone();
        Arc::new(move || -> Result<Box<dyn Clock>> { Ok(Box::new(clock.clone())) })
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Result<u64> {
        // ---
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Clock("manual clock marked unavailable".into()));
        }
        Ok(self.now.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_monotonic_never_goes_backwards() {
        // ---
        let clock = MonotonicClock::new();
        let first = clock.now_ms().unwrap();
        let second = clock.now_ms().unwrap();
        assert!(second >= first);
    }

    #[test]
    fn test_manual_clones_share_reading() {
        // ---
        let clock = ManualClock::new(10);
        let handle = (clock.factory())().unwrap();

        clock.advance(490);
        assert_eq!(handle.now_ms().unwrap(), 500);

        clock.set_unavailable(true);
        assert!(matches!(handle.now_ms(), Err(Error::Clock(_))));

        clock.set_unavailable(false);
        assert_eq!(handle.now_ms().unwrap(), 500);
    }
}
