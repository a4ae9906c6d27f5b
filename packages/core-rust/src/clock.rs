//! Injectable sources of time and identity.
//!
//! The service stamps ids and timestamps through these traits so tests can
//! swap in deterministic sources. [`SystemClock`] and [`UuidGenerator`] are
//! the production defaults.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Abstraction over wall-clock time for dependency injection.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock that returns `start`, then advances by `step` on every call.
#[derive(Debug)]
pub struct SteppingClock {
    next: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl SteppingClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }

    /// A clock frozen at `at`.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::new(at, Duration::zero())
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut next = self.next.lock();
        let now = *next;
        *next = now + self.step;
        now
    }
}

/// Produces identifiers for new foos.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random UUID v4 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Decimal identifiers counting up from `start` by `step`.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
    step: u64,
}

impl SequentialIds {
    #[must_use]
    pub fn new(start: u64, step: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
            step,
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        self.next.fetch_add(self.step, Ordering::Relaxed).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepping_clock_advances() {
        let start = DateTime::<Utc>::UNIX_EPOCH + Duration::hours(1);
        let clock = SteppingClock::new(start, Duration::hours(1));
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start + Duration::hours(1));
    }

    #[test]
    fn fixed_clock_never_moves() {
        let at = Utc::now();
        let clock = SteppingClock::fixed(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), at);
    }

    #[test]
    fn sequential_ids_count() {
        let ids = SequentialIds::new(1, 1);
        assert_eq!(ids.next_id(), "1");
        assert_eq!(ids.next_id(), "2");
    }

    #[test]
    fn uuid_ids_are_unique() {
        let ids = UuidGenerator;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
