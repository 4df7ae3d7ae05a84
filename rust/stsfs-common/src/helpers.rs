//! Testing utilities.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::Clock;

/// A [`Clock`] that only moves when told to.
///
/// Clones share the same instant, so one handle can be given to the code
/// under test while the test advances another.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    /// A clock stopped at `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(now)))
    }

    /// Move the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        let mut now = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *now += Duration::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn it_moves_only_when_advanced() {
        let start = Utc.with_ymd_and_hms(2025, 5, 7, 5, 48, 59).unwrap();
        let clock = ManualClock::at(start);
        let handle = clock.clone();

        assert_eq!(handle.now(), start);
        clock.advance(60);
        assert_eq!(handle.now(), start + Duration::seconds(60));
    }
}
