//! General time utility functions

use std::time::Duration;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a chrono duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Build a std duration from a number of seconds, clamping negative and
/// non-finite values to zero.
pub fn secs(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    }
    else {
        Duration::from_secs(0)
    }
}

/// Sleep the current thread for the given number of seconds.
pub fn sleep_s(seconds: f64) {
    std::thread::sleep(secs(seconds))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_secs() {
        assert_eq!(secs(0.5), Duration::from_millis(500));
        assert_eq!(secs(-1.0), Duration::from_secs(0));
        assert_eq!(secs(std::f64::NAN), Duration::from_secs(0));
        assert_eq!(
            duration_to_seconds(chrono::Duration::milliseconds(1500)),
            Some(1.5)
        );
    }
}
