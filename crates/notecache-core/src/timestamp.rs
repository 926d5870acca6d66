//! Timestamp strings
//!
//! Records carry `created` / `updated` as `YYYY-MM-DD HH:MM:SS.mmmZ` strings.
//! The date and time are separated by a space rather than `T`, and every
//! component is zero padded, so plain string comparison orders them
//! chronologically.
//!
//! The sync engine only persists a record when its `updated` value moved
//! forward, so [`now`] never hands out the same value twice within a process.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

/// Last millisecond value handed out by [`now`]
static LAST_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Current time as a timestamp string, strictly greater than any previous call
pub fn now() -> String {
    let wall = Utc::now().timestamp_millis();
    let mut last = LAST_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = if wall > last { wall } else { last + 1 };
        match LAST_MILLIS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return format_millis(next),
            Err(actual) => last = actual,
        }
    }
}

/// Format a point in time
pub fn format(time: DateTime<Utc>) -> String {
    time.format(FORMAT).to_string()
}

/// Timestamp string for `days` days before now
///
/// Used as the lower bound of the trash retention window.
pub fn days_ago(days: i64) -> String {
    format(Utc::now() - Duration::days(days))
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(format)
        .unwrap_or_else(|| format(Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uses_space_separator() {
        let ts = now();
        assert!(ts.contains(' '));
        assert!(!ts.contains('T'));
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2026-02-11 10:30:45.123Z".len());
    }

    #[test]
    fn test_now_is_strictly_increasing() {
        let mut previous = now();
        for _ in 0..1000 {
            let next = now();
            assert!(next > previous, "{} should be after {}", next, previous);
            previous = next;
        }
    }

    #[test]
    fn test_string_order_matches_time_order() {
        let earlier = DateTime::<Utc>::from_timestamp_millis(1_770_802_245_123).unwrap();
        let later = earlier + Duration::hours(23);
        assert_eq!(format(earlier), "2026-02-11 09:30:45.123Z");
        assert!(format(later) > format(earlier));
    }

    #[test]
    fn test_days_ago_is_in_the_past() {
        let cutoff = days_ago(30);
        assert!(cutoff < now());
        let epoch = format(DateTime::<Utc>::from_timestamp_millis(0).unwrap());
        assert_eq!(epoch, "1970-01-01 00:00:00.000Z");
    }
}
