//! Quiet-hours gating.
//!
//! A daily window during which simpler invocation paths stay silent. The
//! window is expressed in wall-clock time at a configurable fixed offset
//! from UTC (zero by default) and may cross midnight (e.g., 23:00–07:00).

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

/// A daily start/end window. Equal start and end disables the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    start: NaiveTime,
    end: NaiveTime,
    offset_minutes: i32,
}

impl QuietHours {
    /// Window interpreted in UTC wall-clock time.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start,
            end,
            offset_minutes: 0,
        }
    }

    /// Interpret the window at a fixed offset from UTC, in minutes
    /// (e.g., `120` for UTC+2).
    pub fn with_offset_minutes(mut self, minutes: i32) -> Self {
        self.offset_minutes = minutes;
        self
    }

    /// Whether `timestamp` falls inside the quiet window.
    pub fn is_quiet_hour(&self, timestamp: DateTime<Utc>) -> bool {
        self.contains(self.local_time(timestamp))
    }

    fn local_time(&self, timestamp: DateTime<Utc>) -> NaiveTime {
        (timestamp + Duration::minutes(self.offset_minutes as i64)).time()
    }

    fn contains(&self, t: NaiveTime) -> bool {
        if self.start == self.end {
            return false; // window disabled
        }
        if self.start < self.end {
            self.start <= t && t < self.end
        } else {
            // Window crosses midnight.
            t >= self.start || t < self.end
        }
    }

    /// Hours until the window ends, rounded up. Used for friendly gate
    /// messages.
    pub fn hours_until_end(&self, timestamp: DateTime<Utc>) -> u32 {
        if !self.is_quiet_hour(timestamp) {
            return 0;
        }
        let now_secs = self.local_time(timestamp).num_seconds_from_midnight() as i64;
        let end_secs = self.end.num_seconds_from_midnight() as i64;
        let remaining = (end_secs - now_secs).rem_euclid(24 * 3600);
        ((remaining + 3599) / 3600) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, minute, 0).unwrap()
    }

    fn t(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn simple_window() {
        let quiet = QuietHours::new(t(1, 0), t(7, 0));
        assert!(!quiet.is_quiet_hour(at(0, 30)));
        assert!(quiet.is_quiet_hour(at(1, 0)));
        assert!(quiet.is_quiet_hour(at(4, 0)));
        assert!(!quiet.is_quiet_hour(at(7, 0)));
        assert!(!quiet.is_quiet_hour(at(12, 0)));
    }

    #[test]
    fn window_crossing_midnight() {
        let quiet = QuietHours::new(t(23, 0), t(7, 0));
        assert!(quiet.is_quiet_hour(at(23, 30)));
        assert!(quiet.is_quiet_hour(at(2, 0)));
        assert!(!quiet.is_quiet_hour(at(7, 0)));
        assert!(!quiet.is_quiet_hour(at(12, 0)));
    }

    #[test]
    fn equal_bounds_disable_window() {
        let quiet = QuietHours::new(t(3, 0), t(3, 0));
        assert!(!quiet.is_quiet_hour(at(3, 0)));
        assert!(!quiet.is_quiet_hour(at(12, 0)));
    }

    #[test]
    fn offset_shifts_the_window() {
        // 23:00–07:00 at UTC+2.
        let quiet = QuietHours::new(t(23, 0), t(7, 0)).with_offset_minutes(120);
        assert!(quiet.is_quiet_hour(at(21, 30))); // 23:30 local
        assert!(quiet.is_quiet_hour(at(22, 0))); // 00:00 local
        assert!(!quiet.is_quiet_hour(at(6, 0))); // 08:00 local
        assert!(!quiet.is_quiet_hour(at(20, 30))); // 22:30 local

        // Negative offsets shift the other way.
        let quiet = QuietHours::new(t(23, 0), t(7, 0)).with_offset_minutes(-300);
        assert!(quiet.is_quiet_hour(at(4, 30))); // 23:30 local
        assert!(!quiet.is_quiet_hour(at(13, 0))); // 08:00 local
    }

    #[test]
    fn hours_until_end_rounds_up() {
        let quiet = QuietHours::new(t(23, 0), t(7, 0));
        assert_eq!(quiet.hours_until_end(at(6, 30)), 1);
        assert_eq!(quiet.hours_until_end(at(23, 30)), 8);
        assert_eq!(quiet.hours_until_end(at(12, 0)), 0);

        // Exactly one full hour left stays at 1, not 2.
        assert_eq!(quiet.hours_until_end(at(6, 0)), 1);
    }

    #[test]
    fn hours_until_end_respects_offset() {
        let quiet = QuietHours::new(t(23, 0), t(7, 0)).with_offset_minutes(120);
        // 04:30 UTC is 06:30 local: half an hour left, rounded up.
        assert_eq!(quiet.hours_until_end(at(4, 30)), 1);
    }
}
