use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::sync::{Mutex, MutexGuard};

/// A backend timestamp. Values sent with an offset are instants and are
/// shown in the viewer's zone; values without one are already wall-clock
/// time and are shown as sent.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Timestamp {
    Instant(DateTime<Utc>),
    Wall(NaiveDateTime),
}

impl Timestamp {
    pub fn format_in<Tz: TimeZone>(&self, tz: &Tz, pattern: &str) -> String
    where
        Tz::Offset: core::fmt::Display,
    {
        match self {
            Timestamp::Instant(ts) => ts.with_timezone(tz).format(pattern).to_string(),
            Timestamp::Wall(naive) => naive.format(pattern).to_string(),
        }
    }
}

/// Parses a backend timestamp: RFC 3339, an offset-less ISO date-time,
/// or a bare date (midnight wall time).
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(Timestamp::Instant(ts.with_timezone(&Utc)));
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(Timestamp::Wall(naive));
        }
    }
    parse_day(raw).and_then(|d| d.and_hms_opt(0, 0, 0)).map(Timestamp::Wall)
}

/// Parses the date part of a date-keyed payload entry (`2024-01-03` or
/// a full timestamp).
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| raw.get(..10).and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()))
}

/// Locks a mutex, recovering the data if a panicking thread poisoned it.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn wall(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        Timestamp::Wall(NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap())
    }

    #[test]
    fn parses_offset_and_wall_timestamps() {
        let instant = Timestamp::Instant(Utc.with_ymd_and_hms(2024, 1, 3, 10, 15, 0).unwrap());
        assert_eq!(parse_timestamp("2024-01-03T10:15:00Z"), Some(instant));
        assert_eq!(parse_timestamp("2024-01-03T11:15:00+01:00"), Some(instant));
        assert_eq!(parse_timestamp("2024-01-03T10:15:00.000"), Some(wall(2024, 1, 3, 10, 15)));
        assert_eq!(parse_timestamp("2024-01-03 10:15:00"), Some(wall(2024, 1, 3, 10, 15)));
        assert_eq!(parse_timestamp("2024-01-03"), Some(wall(2024, 1, 3, 0, 0)));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn parses_day_keys() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert_eq!(parse_day("2024-01-03"), Some(day));
        assert_eq!(parse_day("2024-01-03T00:00:00Z"), Some(day));
        assert_eq!(parse_day("03/01/2024"), None);
    }

    #[test]
    fn instants_follow_the_viewer_zone_and_wall_times_do_not() {
        let cet = FixedOffset::east_opt(3600).unwrap();
        let instant = parse_timestamp("2024-01-03T10:05:00Z").unwrap();
        assert_eq!(instant.format_in(&Utc, "%H:%M %d/%m/%Y"), "10:05 03/01/2024");
        assert_eq!(instant.format_in(&cet, "%H:%M %d/%m/%Y"), "11:05 03/01/2024");

        let noon = parse_timestamp("2024-01-01T12:00:00").unwrap();
        assert_eq!(noon.format_in(&cet, "%H:%M %d/%m/%Y"), "12:00 01/01/2024");
        assert_eq!(noon.format_in(&FixedOffset::west_opt(8 * 3600).unwrap(), "%H:%M"), "12:00");
    }
}
