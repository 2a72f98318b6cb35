//! Timestamp and duration display utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert fractional seconds to a Duration
///
/// Negative, zero, NaN, infinite and out-of-range inputs carry no usable
/// length and map to None.
pub fn secs_to_duration(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Format a duration for queue listings
///
/// - Under one hour: `M:SS`
/// - One hour or more: `H:MM:SS`
///
/// # Examples
///
/// ```
/// use mbq_common::time::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(75)), "1:15");
/// assert_eq!(format_duration(Duration::from_secs(3661)), "1:01:01");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_secs_to_duration_rejects_unusable_values() {
        assert_eq!(secs_to_duration(0.0), None);
        assert_eq!(secs_to_duration(-3.0), None);
        assert_eq!(secs_to_duration(f64::NAN), None);
        assert_eq!(secs_to_duration(f64::INFINITY), None);
    }

    #[test]
    fn test_secs_to_duration_out_of_range_is_unknown() {
        assert_eq!(secs_to_duration(1e20), None);
        assert_eq!(secs_to_duration(f64::MAX), None);
        assert_eq!(secs_to_duration(86_400.0), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_secs_to_duration_fractional() {
        assert_eq!(secs_to_duration(1.5), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_format_duration_zero() {
        assert_eq!(format_duration(Duration::ZERO), "0:00");
    }

    #[test]
    fn test_format_duration_truncates_fraction() {
        assert_eq!(format_duration(Duration::from_millis(59_999)), "0:59");
    }

    #[test]
    fn test_format_duration_hours() {
        assert_eq!(format_duration(Duration::from_secs(2 * 3600 + 5)), "2:00:05");
    }
}
