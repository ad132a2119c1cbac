//! Mission date handling.
//!
//! Dates are fixed-width `YYYY:DDD:HH:MM:SS.fff` strings (year, day-of-year,
//! time to milliseconds). The format is chosen so that lexicographic ordering
//! of the strings equals chronological ordering, which the command archive
//! and the state pipeline rely on for window filtering and transition
//! sorting. Alongside the string form every `Date` carries mission-elapsed
//! seconds counted from 1998:001:00:00:00.000.
//!
//! Calendar math (leap years, day-of-year) is delegated to `chrono`; this
//! crate only owns the mission string format and the seconds epoch.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use std::cmp::Ordering;
use std::fmt;

/// Errors from parsing mission date strings.
#[derive(Debug, thiserror::Error)]
pub enum TimeError {
    #[error("invalid date {input:?}: {reason}")]
    Invalid { input: String, reason: String },
}

fn epoch() -> NaiveDateTime {
    // 1998:001:00:00:00.000 == 0.0 mission seconds.
    NaiveDate::from_yo_opt(1998, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// A mission date: canonical 25-char string plus elapsed seconds.
///
/// Ordering and equality use the canonical string, which is equivalent to
/// ordering by seconds but keeps comparisons allocation-free against raw
/// archive date columns.
#[derive(Debug, Clone)]
pub struct Date {
    repr: String,
    secs: f64,
}

impl Date {
    /// Parse a date string. Accepts the full `YYYY:DDD:HH:MM:SS.fff` form as
    /// well as the truncated `YYYY:DDD` and `YYYY:DDD:HH:MM:SS` forms, which
    /// normalize with zero fill.
    pub fn parse(input: &str) -> Result<Self, TimeError> {
        let err = |reason: &str| TimeError::Invalid {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = input.split(':').collect();
        if !matches!(parts.len(), 2 | 5) {
            return Err(err("expected YYYY:DDD or YYYY:DDD:HH:MM:SS[.fff]"));
        }

        let year: i32 = parts[0].parse().map_err(|_| err("bad year"))?;
        let yday: u32 = parts[1].parse().map_err(|_| err("bad day-of-year"))?;
        let date = NaiveDate::from_yo_opt(year, yday).ok_or_else(|| err("day out of range"))?;

        let (hour, min, sec, millis) = if parts.len() == 2 {
            (0, 0, 0, 0)
        } else {
            let hour: u32 = parts[2].parse().map_err(|_| err("bad hour"))?;
            let min: u32 = parts[3].parse().map_err(|_| err("bad minute"))?;
            let (sec_str, frac_str) = match parts[4].split_once('.') {
                Some((s, f)) => (s, Some(f)),
                None => (parts[4], None),
            };
            let sec: u32 = sec_str.parse().map_err(|_| err("bad second"))?;
            let millis: u32 = match frac_str {
                None => 0,
                Some(f) if f.len() == 3 => f.parse().map_err(|_| err("bad milliseconds"))?,
                Some(_) => return Err(err("fractional seconds must be 3 digits")),
            };
            (hour, min, sec, millis)
        };

        let dt = date
            .and_hms_milli_opt(hour, min, sec, millis)
            .ok_or_else(|| err("time out of range"))?;
        Ok(Self::from_datetime(dt))
    }

    /// The current UTC time as a mission date.
    pub fn now() -> Self {
        Self::from_datetime(chrono::Utc::now().naive_utc())
    }

    /// Construct from mission-elapsed seconds, rounded to milliseconds.
    pub fn from_secs(secs: f64) -> Self {
        let millis = (secs * 1000.0).round() as i64;
        Self::from_datetime(epoch() + Duration::milliseconds(millis))
    }

    fn from_datetime(dt: NaiveDateTime) -> Self {
        let millis = dt.and_utc().timestamp_subsec_millis();
        let repr = format!(
            "{:04}:{:03}:{:02}:{:02}:{:02}.{:03}",
            dt.year(),
            dt.ordinal(),
            dt.hour(),
            dt.minute(),
            dt.second(),
            millis,
        );
        let elapsed = dt - epoch();
        let secs = elapsed.num_milliseconds() as f64 / 1000.0;
        Self { repr, secs }
    }

    /// Mission-elapsed seconds since 1998:001:00:00:00.000.
    pub fn secs(&self) -> f64 {
        self.secs
    }

    /// Canonical 25-char date string.
    pub fn as_str(&self) -> &str {
        &self.repr
    }

    pub fn add_secs(&self, secs: f64) -> Self {
        Self::from_secs(self.secs + secs)
    }

    /// Offset by (fractional) days.
    pub fn add_days(&self, days: f64) -> Self {
        self.add_secs(days * 86400.0)
    }

    pub fn sub_days(&self, days: f64) -> Self {
        self.add_days(-days)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl PartialEq for Date {
    fn eq(&self, other: &Self) -> bool {
        self.repr == other.repr
    }
}

impl Eq for Date {}

impl PartialOrd for Date {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Date {
    fn cmp(&self, other: &Self) -> Ordering {
        self.repr.cmp(&other.repr)
    }
}

/// Convert mission-elapsed seconds directly to the canonical string form.
pub fn secs_to_date(secs: f64) -> String {
    Date::from_secs(secs).repr
}

/// Convert a date string to mission-elapsed seconds.
pub fn date_to_secs(date: &str) -> Result<f64, TimeError> {
    Ok(Date::parse(date)?.secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_is_zero() {
        let d = Date::parse("1998:001:00:00:00.000").unwrap();
        assert_eq!(d.secs(), 0.0);
        assert_eq!(d.as_str(), "1998:001:00:00:00.000");
    }

    #[test]
    fn parse_full_form_round_trips() {
        let s = "2020:123:04:05:06.789";
        let d = Date::parse(s).unwrap();
        assert_eq!(d.as_str(), s);
        assert_eq!(Date::from_secs(d.secs()).as_str(), s);
    }

    #[test]
    fn parse_truncated_forms_zero_fill() {
        assert_eq!(
            Date::parse("2012:001").unwrap().as_str(),
            "2012:001:00:00:00.000"
        );
        assert_eq!(
            Date::parse("2012:001:12:30:45").unwrap().as_str(),
            "2012:001:12:30:45.000"
        );
    }

    #[test]
    fn ordering_matches_seconds() {
        let a = Date::parse("2019:365:23:59:59.999").unwrap();
        let b = Date::parse("2020:001:00:00:00.000").unwrap();
        assert!(a < b);
        assert!(a.secs() < b.secs());
    }

    #[test]
    fn day_arithmetic_crosses_leap_year_end() {
        // 2020 is a leap year with 366 days.
        let d = Date::parse("2020:366:00:00:00.000").unwrap();
        assert_eq!(d.add_days(1.0).as_str(), "2021:001:00:00:00.000");
        assert_eq!(
            Date::parse("2021:001").unwrap().sub_days(1.0).as_str(),
            "2020:366:00:00:00.000"
        );
    }

    #[test]
    fn add_secs_fractional_rounds_to_millis() {
        let d = Date::parse("2020:001:00:00:00.000").unwrap();
        assert_eq!(d.add_secs(0.0004).as_str(), "2020:001:00:00:00.000");
        assert_eq!(d.add_secs(0.0006).as_str(), "2020:001:00:00:00.001");
        assert_eq!(d.add_secs(660.0).as_str(), "2020:001:00:11:00.000");
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in [
            "2020-001T00:00:00",
            "2020:400:00:00:00.000",
            "2020:001:25:00:00.000",
            "garbage",
            "2020:001:00:00:00.1",
        ] {
            assert!(Date::parse(bad).is_err(), "expected error for {bad}");
        }
    }
}
