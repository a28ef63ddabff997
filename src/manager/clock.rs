use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Trait for abstracting time, enabling deterministic testing.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real clock backed by system time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for deterministic testing — time only advances when told to.
/// Uses std::sync::RwLock (not tokio) so it can be called from both sync
/// and async contexts without panicking.
pub struct FakeClock {
    time: Arc<std::sync::RwLock<DateTime<Utc>>>,
}

impl FakeClock {
    /// Create a FakeClock pinned to the given instant.
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(std::sync::RwLock::new(time)),
        }
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.write().unwrap() = time;
    }

    /// Advance the clock by a chrono::Duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut t = self.time.write().unwrap();
        *t += duration;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.read().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fake_clock_new_and_now() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = FakeClock::new(t);
        assert_eq!(clock.now(), t);
    }

    #[test]
    fn test_fake_clock_set() {
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let clock = FakeClock::new(t1);
        clock.set(t2);
        assert_eq!(clock.now(), t2);
    }

    #[test]
    fn test_fake_clock_advance() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = FakeClock::new(t);
        clock.advance(chrono::Duration::hours(1));
        let expected = Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap();
        assert_eq!(clock.now(), expected);
    }

    #[test]
    fn test_system_clock_returns_recent_time() {
        let clock = SystemClock;
        let now = clock.now();
        let actual_now = Utc::now();
        let diff = (actual_now - now).num_seconds().abs();
        assert!(diff < 2, "SystemClock should return approximately now");
    }
}
