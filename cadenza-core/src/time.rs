//! Clock abstraction and time conversion utilities.
//!
//! Everything that compares timestamps (rate limiting, cache expiry) reads the
//! current time through [`Clock`] so tests can drive time by hand.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by.to_time_delta();
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map_or_else(|poisoned| *poisoned.into_inner(), |now| *now)
    }
}

/// Extension trait for safe Duration conversions.
pub trait DurationExt {
    /// Convert duration to milliseconds as i64, saturating at `i64::MAX`.
    fn as_millis_i64(&self) -> i64;

    /// Convert to a chrono delta, saturating at `TimeDelta::MAX`.
    fn to_time_delta(&self) -> TimeDelta;
}

impl DurationExt for Duration {
    fn as_millis_i64(&self) -> i64 {
        i64::try_from(self.as_millis()).unwrap_or(i64::MAX)
    }

    fn to_time_delta(&self) -> TimeDelta {
        TimeDelta::from_std(*self).unwrap_or(TimeDelta::MAX)
    }
}

/// Elapsed time between two instants, zero if `later` is not after `earlier`.
#[must_use]
pub fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

/// Convert epoch milliseconds to a timestamp, `None` if out of range.
#[must_use]
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(epoch());
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), epoch() + TimeDelta::seconds(90));
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::new(epoch());
        let later = epoch() + TimeDelta::hours(3);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn test_as_millis_i64() {
        assert_eq!(Duration::from_millis(5000).as_millis_i64(), 5000);
        assert_eq!(Duration::ZERO.as_millis_i64(), 0);
    }

    #[test]
    fn test_to_time_delta() {
        assert_eq!(
            Duration::from_secs(300).to_time_delta(),
            TimeDelta::seconds(300)
        );
    }

    #[test]
    fn test_elapsed_between_never_negative() {
        let later = epoch() + TimeDelta::seconds(10);
        assert_eq!(elapsed_between(epoch(), later), Duration::from_secs(10));
        assert_eq!(elapsed_between(later, epoch()), Duration::ZERO);
    }

    #[test]
    fn test_from_millis_roundtrips_epoch() {
        let ts = from_millis(1_700_000_000_000).unwrap();
        assert_eq!(ts, epoch());
    }
}
