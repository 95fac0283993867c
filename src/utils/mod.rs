//! Utility functions and helpers.

pub mod http;
pub mod ring;
pub mod url;

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

pub use ring::RingBuffer;

/// Wall-clock "now" that never goes backwards relative to `previous`.
///
/// Keeps `updated_at >= created_at` even if the system clock steps back.
pub fn monotonic_now(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

/// Lock a std mutex, recovering the data if a holder panicked.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_monotonic_now_never_regresses() {
        let future = Utc::now() + Duration::hours(1);
        assert_eq!(monotonic_now(future), future);
        let past = Utc::now() - Duration::hours(1);
        assert!(monotonic_now(past) > past);
    }
}
