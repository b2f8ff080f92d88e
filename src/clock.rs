//! Time source for the controller
//!
//! Timers and cooldowns are measured against a [`Clock`] so tests can move
//! time forward instead of sleeping.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Monotonic time for intervals and deadlines
    fn now(&self) -> Instant;

    /// Wall-clock Unix seconds for presence timestamps
    fn unix_timestamp(&self) -> i64;
}

/// The real clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_timestamp(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    unix_origin: i64,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(unix_origin: i64) -> Self {
        Self {
            origin: Instant::now(),
            unix_origin,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset()
    }

    fn offset(&self) -> std::sync::MutexGuard<'_, Duration> {
        self.offset
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_700_000_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn unix_timestamp(&self) -> i64 {
        self.unix_origin + self.elapsed().as_secs() as i64
    }
}
