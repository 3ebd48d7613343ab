//! Calendar time for the logger and the external clock/status interfaces
//!
//! All stored timestamps are seconds since 2000-01-01 00:00:00 (the RTC
//! epoch), which fits a `u32` well past the service life of the device.

use core::fmt::{self, Display};

/// Seconds in one calendar day
pub const SECS_PER_DAY: u32 = 86_400;

/// Seconds since 2000-01-01 00:00:00
pub type EpochSecs = u32;

/// External real-time clock
pub trait TimeBase {
    /// Current wall-clock date and time
    fn now(&self) -> DateTime;
}

/// External device telemetry appended to block footers
pub trait DeviceStatus {
    /// Supply voltage in millivolts
    fn battery_millivolts(&self) -> u16;
    /// Modem signal quality (CSQ, 0..=31, 99 unknown)
    fn signal_quality(&self) -> u8;
}

/// Calendar date
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

/// Calendar date plus time of day, second resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime {
    pub date: Date,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// Days since 1970-01-01 for a proleptic Gregorian date
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

const EPOCH_DAYS: i64 = 10_957; // 2000-01-01 relative to 1970-01-01

impl Date {
    pub const fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    /// Whether the fields describe a real calendar day on or after 2000-01-01
    pub fn is_valid(&self) -> bool {
        if self.year < 2000 || !(1..=12).contains(&self.month) || self.day == 0 {
            return false;
        }
        self.day <= days_in_month(self.year, self.month)
    }

    /// Days since 2000-01-01
    pub fn days_since_epoch(&self) -> u32 {
        let days = days_from_civil(self.year as i64, self.month as i64, self.day as i64);
        (days - EPOCH_DAYS).max(0) as u32
    }

    pub fn from_days_since_epoch(days: u32) -> Self {
        let (y, m, d) = civil_from_days(days as i64 + EPOCH_DAYS);
        Self {
            year: y as u16,
            month: m as u8,
            day: d as u8,
        }
    }

    /// Midnight at the start of this date
    pub fn midnight(&self) -> EpochSecs {
        self.days_since_epoch() * SECS_PER_DAY
    }

    /// The calendar day before this one (saturates at the epoch)
    pub fn previous(&self) -> Self {
        Self::from_days_since_epoch(self.days_since_epoch().saturating_sub(1))
    }
}

pub fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        _ => 0,
    }
}

impl DateTime {
    pub const fn new(date: Date, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            date,
            hour,
            minute,
            second,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.date.is_valid() && self.hour < 24 && self.minute < 60 && self.second < 60
    }

    pub fn from_epoch_secs(secs: EpochSecs) -> Self {
        let date = Date::from_days_since_epoch(secs / SECS_PER_DAY);
        let sod = secs % SECS_PER_DAY;
        Self {
            date,
            hour: (sod / 3600) as u8,
            minute: (sod / 60 % 60) as u8,
            second: (sod % 60) as u8,
        }
    }

    pub fn epoch_secs(&self) -> EpochSecs {
        self.date.midnight() + self.secs_of_day()
    }

    pub fn secs_of_day(&self) -> u32 {
        self.hour as u32 * 3600 + self.minute as u32 * 60 + self.second as u32
    }
}

impl Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}:{:02}",
            self.date, self.hour, self.minute, self.second
        )
    }
}

/// Writes `HH:MM:SS` for a seconds-of-day value
pub struct ClockTime(pub u32);

impl Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0 % SECS_PER_DAY;
        write!(f, "{:02}:{:02}:{:02}", s / 3600, s / 60 % 60, s % 60)
    }
}

/// Parses `HH:MM:SS` into seconds of day
pub fn parse_clock_time(text: &str) -> Option<u32> {
    let mut parts = text.split(':');
    let h: u32 = parts.next()?.parse().ok()?;
    let m: u32 = parts.next()?.parse().ok()?;
    let s: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || h > 23 || m > 59 || s > 59 {
        return None;
    }
    Some(h * 3600 + m * 60 + s)
}

/// Interval code table. The code is the index; values are seconds.
pub const INTERVAL_SECS: [u32; 19] = [
    1, 2, 5, 10, 15, 30, 60, 120, 300, 600, 900, 1800, 3600, 7200, 10_800, 14_400, 21_600,
    43_200, 86_400,
];

/// Seconds for an interval code, `None` for codes outside the table
pub fn interval_secs(code: u8) -> Option<u32> {
    INTERVAL_SECS.get(code as usize).copied()
}

/// A clock the simulator and tests can move by hand
#[derive(Debug)]
pub struct ManualClock {
    now: core::cell::Cell<EpochSecs>,
}

impl ManualClock {
    pub fn new(start: DateTime) -> Self {
        Self {
            now: core::cell::Cell::new(start.epoch_secs()),
        }
    }

    pub fn set(&self, at: DateTime) {
        self.now.set(at.epoch_secs());
    }

    pub fn advance(&self, secs: u32) {
        self.now.set(self.now.get() + secs);
    }
}

impl TimeBase for ManualClock {
    fn now(&self) -> DateTime {
        DateTime::from_epoch_secs(self.now.get())
    }
}

impl<T: TimeBase> TimeBase for &T {
    fn now(&self) -> DateTime {
        (**self).now()
    }
}

/// Fixed battery/signal values for hosts without a modem
#[derive(Debug, Clone, Copy)]
pub struct FixedStatus {
    pub battery_mv: u16,
    pub csq: u8,
}

impl DeviceStatus for FixedStatus {
    fn battery_millivolts(&self) -> u16 {
        self.battery_mv
    }

    fn signal_quality(&self) -> u8 {
        self.csq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_roundtrip_across_leap_day() {
        let dt = DateTime::new(Date::new(2024, 2, 29), 23, 59, 59);
        let secs = dt.epoch_secs();
        assert_eq!(DateTime::from_epoch_secs(secs), dt);
        assert_eq!(
            DateTime::from_epoch_secs(secs + 1),
            DateTime::new(Date::new(2024, 3, 1), 0, 0, 0)
        );
    }

    #[test]
    fn test_epoch_start() {
        assert_eq!(Date::new(2000, 1, 1).days_since_epoch(), 0);
        assert_eq!(Date::new(2000, 1, 2).midnight(), SECS_PER_DAY);
    }

    #[test]
    fn test_previous_day_crosses_year() {
        assert_eq!(Date::new(2026, 1, 1).previous(), Date::new(2025, 12, 31));
    }

    #[test]
    fn test_clock_time_format_and_parse() {
        let text = alloc::format!("{}", ClockTime(3 * 3600 + 4 * 60 + 5));
        assert_eq!(text, "03:04:05");
        assert_eq!(parse_clock_time(&text), Some(11_045));
        assert_eq!(parse_clock_time("24:00:00"), None);
        assert_eq!(parse_clock_time("--:--:--"), None);
    }

    #[test]
    fn test_interval_table() {
        assert_eq!(interval_secs(10), Some(900));
        assert_eq!(interval_secs(19), None);
    }

    #[test]
    fn test_date_validation() {
        assert!(Date::new(2026, 10, 16).is_valid());
        assert!(!Date::new(2026, 2, 29).is_valid());
        assert!(!Date::new(1999, 12, 31).is_valid());
    }
}
