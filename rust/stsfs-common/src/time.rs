//! Cross-platform time utilities.
//!
//! This module provides time utilities that work on both native and WASM
//! targets, plus the [`Clock`] seam through which credential freshness is
//! decided.

use chrono::{DateTime, Utc};

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current system time.
///
/// Uses `std::time::SystemTime::now()` on native and `web_time::SystemTime::now().to_std()`
/// on WASM.
#[cfg(not(target_arch = "wasm32"))]
pub fn now() -> SystemTime {
    SystemTime::now()
}

/// Returns the current system time.
///
/// Uses `std::time::SystemTime::now()` on native and `web_time::SystemTime::now().to_std()`
/// on WASM.
#[cfg(target_arch = "wasm32")]
pub fn now() -> SystemTime {
    use web_time::web::SystemTimeExt;
    web_time::SystemTime::now().to_std()
}

/// Returns the current time as a UTC datetime.
pub fn utc_now() -> DateTime<Utc> {
    DateTime::<Utc>::from(now())
}

/// A source of "now".
///
/// Everything that compares timestamps against the present asks a [`Clock`]
/// rather than the system directly, so that tests can pin the present to a
/// known instant.
pub trait Clock {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The [`Clock`] backed by the platform's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        utc_now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
