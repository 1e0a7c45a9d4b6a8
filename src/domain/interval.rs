use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ForecastError, Result};

// ============================================================================
// Calendar constants
// ============================================================================

/// Length of one settlement interval in minutes
pub const INTERVAL_MINUTES: i64 = 15;

/// Settlement intervals per hour
pub const INTERVALS_PER_HOUR: u8 = 4;

/// Settlement intervals per calendar day
pub const INTERVALS_PER_DAY: usize = 96;

/// Key of one 15-minute settlement period.
///
/// `delivery_hour` is hour-beginning (0-23) and `delivery_interval` is the
/// quarter within that hour (1-4). Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IntervalKey {
    pub delivery_date: NaiveDate,
    pub delivery_hour: u8,
    pub delivery_interval: u8,
}

impl IntervalKey {
    /// Build a key, rejecting hours outside 0-23 and intervals outside 1-4
    pub fn new(delivery_date: NaiveDate, delivery_hour: u8, delivery_interval: u8) -> Result<Self> {
        if delivery_hour > 23 {
            return Err(ForecastError::InvalidKey(format!(
                "delivery hour {delivery_hour} outside 0-23"
            )));
        }
        if !(1..=INTERVALS_PER_HOUR).contains(&delivery_interval) {
            return Err(ForecastError::InvalidKey(format!(
                "delivery interval {delivery_interval} outside 1-4"
            )));
        }
        Ok(Self {
            delivery_date,
            delivery_hour,
            delivery_interval,
        })
    }

    /// Key of the interval that contains `ts`
    pub fn containing(ts: NaiveDateTime) -> Self {
        Self {
            delivery_date: ts.date(),
            delivery_hour: ts.hour() as u8,
            delivery_interval: (ts.minute() / INTERVAL_MINUTES as u32) as u8 + 1,
        }
    }

    /// Start instant of the interval
    pub fn start(&self) -> NaiveDateTime {
        let minutes = self.delivery_hour as i64 * 60
            + (self.delivery_interval as i64 - 1) * INTERVAL_MINUTES;
        self.delivery_date.and_time(NaiveTime::MIN) + Duration::minutes(minutes)
    }

    /// The key `n` intervals later
    pub fn advance(&self, n: i64) -> Self {
        Self::containing(self.start() + Duration::minutes(n * INTERVAL_MINUTES))
    }

    /// The key immediately following this one
    pub fn next(&self) -> Self {
        self.advance(1)
    }

    /// The four keys covering the hour that starts at `hour_start`
    pub fn quarters_of(hour_start: NaiveDateTime) -> [Self; 4] {
        let date = hour_start.date();
        let hour = hour_start.hour() as u8;
        [1, 2, 3, 4].map(|interval| Self {
            delivery_date: date,
            delivery_hour: hour,
            delivery_interval: interval,
        })
    }

    pub fn calendar(&self) -> CalendarFeatures {
        CalendarFeatures::from_date(self.delivery_date)
    }
}

impl fmt::Display for IntervalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} h{:02} i{}",
            self.delivery_date, self.delivery_hour, self.delivery_interval
        )
    }
}

/// Calendar features derived from the delivery date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: u32,
    /// Month (1-12)
    pub month: u32,
    pub year: i32,
}

impl CalendarFeatures {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            day_of_week: date.weekday().num_days_from_monday(),
            month: date.month(),
            year: date.year(),
        }
    }
}

// ============================================================================
// Source field parsing
// ============================================================================

/// Parse a calendar date in either `YYYY-MM-DD` or `MM/DD/YYYY` form.
///
/// A trailing time component (`2024-01-01T00:00:00`, `2024-01-01 00:00:00`)
/// is ignored.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed
        .split(|c: char| c == 'T' || c == ' ')
        .next()
        .unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%m/%d/%Y"))
        .ok()
}

/// Parse an hour-ending label (`"01:00"`, `"0100"`, `"1"`, `"HE24"`) into 1-24.
///
/// The first run of digits is the hour; any prefix before it is ignored.
pub fn parse_hour_ending(raw: &str) -> Option<u8> {
    let digits: String = raw
        .trim()
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let hour_digits = match digits.len() {
        0 => return None,
        // HHMM without a separator
        3 | 4 => &digits[..digits.len() - 2],
        _ => digits.as_str(),
    };
    let hour: u8 = hour_digits.parse().ok()?;
    (1..=24).contains(&hour).then_some(hour)
}

/// Parse a source timestamp such as `2024-01-01T00:05:00` or `2024-01-01 00:05:00`
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

/// Start of the hour described by an operating day and an hour-ending value
pub fn hour_start(date: NaiveDate, hour_ending: u8) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::hours(hour_ending as i64 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_key_rejects_out_of_range() {
        assert!(IntervalKey::new(date(2024, 1, 1), 24, 1).is_err());
        assert!(IntervalKey::new(date(2024, 1, 1), 0, 0).is_err());
        assert!(IntervalKey::new(date(2024, 1, 1), 0, 5).is_err());
        assert!(IntervalKey::new(date(2024, 1, 1), 23, 4).is_ok());
    }

    #[test]
    fn test_next_rolls_over_midnight() {
        let last = IntervalKey::new(date(2024, 1, 31), 23, 4).unwrap();
        let next = last.next();
        assert_eq!(next, IntervalKey::new(date(2024, 2, 1), 0, 1).unwrap());
        assert_eq!(next.start() - last.start(), Duration::minutes(15));
    }

    #[test]
    fn test_day_has_96_distinct_keys() {
        let first = IntervalKey::new(date(2024, 3, 5), 0, 1).unwrap();
        let keys: std::collections::BTreeSet<_> = (0..INTERVALS_PER_DAY as i64)
            .map(|n| first.advance(n))
            .collect();
        assert_eq!(keys.len(), 96);
        assert!(keys.iter().all(|k| k.delivery_date == date(2024, 3, 5)));
    }

    #[test]
    fn test_ordering_is_chronological() {
        let a = IntervalKey::new(date(2024, 1, 1), 5, 4).unwrap();
        let b = IntervalKey::new(date(2024, 1, 1), 6, 1).unwrap();
        let c = IntervalKey::new(date(2024, 1, 2), 0, 1).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_calendar_features() {
        // 2024-01-01 was a Monday
        let cal = CalendarFeatures::from_date(date(2024, 1, 1));
        assert_eq!(cal.day_of_week, 0);
        assert_eq!(cal.month, 1);
        assert_eq!(cal.year, 2024);
        assert_eq!(CalendarFeatures::from_date(date(2024, 1, 7)).day_of_week, 6);
    }

    #[rstest]
    #[case("01:00", Some(1))]
    #[case("24:00", Some(24))]
    #[case("0100", Some(1))]
    #[case("2400", Some(24))]
    #[case("7", Some(7))]
    #[case("13", Some(13))]
    #[case("00:00", None)]
    #[case("25:00", None)]
    #[case("", None)]
    #[case("HE1", Some(1))]
    #[case("HE 24", Some(24))]
    #[case("HE", None)]
    fn test_parse_hour_ending(#[case] raw: &str, #[case] expected: Option<u8>) {
        assert_eq!(parse_hour_ending(raw), expected);
    }

    #[rstest]
    #[case("2024-01-15", Some(date(2024, 1, 15)))]
    #[case("01/15/2024", Some(date(2024, 1, 15)))]
    #[case("2024-01-15T00:00:00", Some(date(2024, 1, 15)))]
    #[case("15.01.2024", None)]
    fn test_parse_calendar_date(#[case] raw: &str, #[case] expected: Option<NaiveDate>) {
        assert_eq!(parse_calendar_date(raw), expected);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = date(2024, 1, 1).and_hms_opt(0, 5, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T00:05:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 00:05:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T00:05:00-06:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_hour_start_maps_hour_ending_24_to_hour_23() {
        let ts = hour_start(date(2024, 1, 1), 24);
        assert_eq!(ts, date(2024, 1, 1).and_hms_opt(23, 0, 0).unwrap());
        assert_eq!(IntervalKey::containing(ts).delivery_hour, 23);
    }
}
