//! Injectable wall clock.
//!
//! Every component that compares timestamps (key selection, cache expiry,
//! claim construction) reads time through [`Clock`] so tests can pin or
//! advance it. Production code uses [`SystemClock`].

use chrono::{DateTime, Utc};
use std::fmt;

/// Source of the current instant.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use fixed::FixedClock;

#[cfg(any(test, feature = "test-utils"))]
mod fixed {
    use super::Clock;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::{PoisonError, RwLock};

    /// Clock that only moves when told to.
    #[derive(Debug)]
    pub struct FixedClock {
        now: RwLock<DateTime<Utc>>,
    }

    impl FixedClock {
        /// Creates a clock pinned at `now`.
        #[must_use]
        pub fn new(now: DateTime<Utc>) -> Self {
            Self {
                now: RwLock::new(now),
            }
        }

        /// Moves the clock to `now`.
        pub fn set(&self, now: DateTime<Utc>) {
            *self.now.write().unwrap_or_else(PoisonError::into_inner) = now;
        }

        /// Moves the clock forward by `by`.
        pub fn advance(&self, by: Duration) {
            let mut guard = self.now.write().unwrap_or_else(PoisonError::into_inner);
            *guard += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.read().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_system_clock_tracks_utc_now() {
        let before = Utc::now();
        let now = SystemClock.now();
        let after = Utc::now();
        assert!(before <= now && now <= after);
    }

    #[test]
    fn test_fixed_clock_set_and_advance() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), start + Duration::seconds(90));

        let later = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn test_fixed_clock_usable_as_trait_object() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock: std::sync::Arc<dyn Clock> = std::sync::Arc::new(FixedClock::new(start));
        assert_eq!(clock.now(), start);
    }
}
