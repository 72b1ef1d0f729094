//! CF-convention time decoding
//!
//! Climate model stores encode time as numeric offsets (`"days since 1850-01-01"`)
//! in one of several model calendars. This module decodes those offsets into
//! calendar dates and implements the inclusive, partial-date range selection
//! used to subset a store by experiment period.

use crate::errors::{Cmip6Error, Result};
use chrono::{Datelike, NaiveDate, TimeDelta};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// CF calendars found in CMIP6 output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    /// Mixed Julian/Gregorian calendar, decoded as proleptic Gregorian
    Standard,
    ProlepticGregorian,
    NoLeap,
    AllLeap,
    Day360,
    Julian,
}

impl Calendar {
    /// Parses a CF `calendar` attribute value (case-insensitive)
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "standard" | "gregorian" => Ok(Calendar::Standard),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            "julian" => Ok(Calendar::Julian),
            other => Err(Cmip6Error::InvalidTime {
                message: format!("unknown calendar '{}'", other),
            }),
        }
    }

    fn is_gregorian(self) -> bool {
        matches!(self, Calendar::Standard | Calendar::ProlepticGregorian)
    }

    fn is_leap(self, year: i32) -> bool {
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
            }
            Calendar::Julian => year.rem_euclid(4) == 0,
            Calendar::AllLeap => true,
            Calendar::NoLeap | Calendar::Day360 => false,
        }
    }

    /// Number of days in `month` (1-based) of `year`
    pub fn days_in_month(self, year: i32, month: u32) -> u32 {
        if self == Calendar::Day360 {
            return 30;
        }
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            _ if self.is_leap(year) => 29,
            _ => 28,
        }
    }

    /// Days from 0000-01-01 to the first day of `year` for the non-Gregorian calendars
    fn days_before_year(self, year: i32) -> i64 {
        let y = i64::from(year);
        match self {
            Calendar::NoLeap => 365 * y,
            Calendar::AllLeap => 366 * y,
            Calendar::Day360 => 360 * y,
            // leap years in [0, year) are the multiples of four
            _ => 365 * y + (y + 3).div_euclid(4),
        }
    }

    fn days_in_year(self, year: i32) -> i64 {
        self.days_before_year(year + 1) - self.days_before_year(year)
    }

    fn to_ordinal(self, date: CalendarDate) -> i64 {
        let before_month: i64 = (1..date.month)
            .map(|m| i64::from(self.days_in_month(date.year, m)))
            .sum();
        self.days_before_year(date.year) + before_month + i64::from(date.day) - 1
    }

    fn from_ordinal(self, ordinal: i64) -> Result<CalendarDate> {
        let mean_year_length = match self {
            Calendar::NoLeap => 365.0,
            Calendar::AllLeap => 366.0,
            Calendar::Day360 => 360.0,
            _ => 365.25,
        };
        let mut year = i32::try_from((ordinal as f64 / mean_year_length).floor() as i64)
            .map_err(|_| Cmip6Error::InvalidTime {
                message: format!("day offset {} is out of range", ordinal),
            })?;
        while self.days_before_year(year) > ordinal {
            year -= 1;
        }
        while self.days_before_year(year + 1) <= ordinal {
            year += 1;
        }

        let mut remaining = ordinal - self.days_before_year(year);
        debug_assert!(remaining < self.days_in_year(year));
        let mut month = 1;
        loop {
            let month_len = i64::from(self.days_in_month(year, month));
            if remaining < month_len || month == 12 {
                break;
            }
            remaining -= month_len;
            month += 1;
        }

        Ok(CalendarDate {
            year,
            month,
            day: remaining as u32 + 1,
        })
    }

    /// Adds a (possibly negative) number of whole days to a date
    pub fn add_days(self, date: CalendarDate, days: i64) -> Result<CalendarDate> {
        if self.is_gregorian() {
            let out_of_range = || Cmip6Error::InvalidTime {
                message: format!("{} + {} days is out of range", date, days),
            };
            let start =
                NaiveDate::from_ymd_opt(date.year, date.month, date.day).ok_or_else(out_of_range)?;
            let shifted = TimeDelta::try_days(days)
                .and_then(|delta| start.checked_add_signed(delta))
                .ok_or_else(out_of_range)?;
            return Ok(CalendarDate {
                year: shifted.year(),
                month: shifted.month(),
                day: shifted.day(),
            });
        }
        self.from_ordinal(self.to_ordinal(date) + days)
    }
}

/// A calendar date without time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl CalendarDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Decoded `"<unit> since <reference>"` time units together with a calendar
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUnits {
    pub seconds_per_unit: f64,
    pub reference: CalendarDate,
    /// Seconds after midnight of the reference date
    pub reference_seconds: f64,
    pub calendar: Calendar,
}

impl TimeUnits {
    /// Parses CF `units` and `calendar` attribute values
    ///
    /// # Errors
    ///
    /// Returns [`Cmip6Error::InvalidTime`] if the units are not of the form
    /// `<unit> since <date>[ <time>]` or the calendar is unknown.
    pub fn parse(units: &str, calendar: Option<&str>) -> Result<Self> {
        let invalid = |message: String| Cmip6Error::InvalidTime { message };
        let calendar = Calendar::parse(calendar.unwrap_or("standard"))?;

        let (unit, reference) = units
            .split_once(" since ")
            .ok_or_else(|| invalid(format!("units '{}' lack a 'since' reference", units)))?;

        let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => SECONDS_PER_DAY,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3_600.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
            other => return Err(invalid(format!("unsupported time unit '{}'", other))),
        };

        let reference = reference.trim().trim_end_matches("UTC").trim_end_matches('Z').trim();
        let (date_part, time_part) = match reference.split_once(|c| c == ' ' || c == 'T') {
            Some((date, time)) => (date, Some(time.trim())),
            None => (reference, None),
        };

        let mut fields = date_part.splitn(3, '-');
        let mut next_field = |name: &str| -> Result<i64> {
            fields
                .next()
                .and_then(|f| f.trim().parse::<i64>().ok())
                .ok_or_else(|| invalid(format!("bad {} in reference date '{}'", name, reference)))
        };
        let year = next_field("year")?;
        let month = next_field("month")?;
        let day = next_field("day")?;
        let reference_date = CalendarDate::new(year as i32, month as u32, day as u32);
        if !(1..=12).contains(&reference_date.month)
            || reference_date.day == 0
            || reference_date.day > calendar.days_in_month(reference_date.year, reference_date.month)
        {
            return Err(invalid(format!("reference date '{}' is not valid", reference)));
        }

        let reference_seconds = match time_part.filter(|t| !t.is_empty()) {
            Some(time) => parse_time_of_day(time)
                .ok_or_else(|| invalid(format!("bad time of day in '{}'", reference)))?,
            None => 0.0,
        };

        Ok(Self {
            seconds_per_unit,
            reference: reference_date,
            reference_seconds,
            calendar,
        })
    }

    /// Decodes one encoded time value into its calendar date
    pub fn decode(&self, value: f64) -> Result<CalendarDate> {
        if !value.is_finite() {
            return Err(Cmip6Error::InvalidTime {
                message: format!("non-finite time value {}", value),
            });
        }
        let seconds = self.reference_seconds + value * self.seconds_per_unit;
        // absorb float noise such as 0.99999999 days
        let days = (seconds / SECONDS_PER_DAY + 1e-9).floor() as i64;
        self.calendar.add_days(self.reference, days)
    }
}

fn parse_time_of_day(time: &str) -> Option<f64> {
    let mut parts = time.split(':');
    let hours: f64 = parts.next()?.trim().parse().ok()?;
    let minutes: f64 = parts.next().map_or(Some(0.0), |m| m.trim().parse().ok())?;
    let seconds: f64 = parts.next().map_or(Some(0.0), |s| s.trim().parse().ok())?;
    Some(hours * 3_600.0 + minutes * 60.0 + seconds)
}

/// A partial date bound: a year, optionally refined by month and day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBound {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    /// The bound as written in the settings, used in output file names
    pub label: String,
}

impl TimeBound {
    /// Parses `"YYYY"`, `"YYYY-MM"` or `"YYYY-MM-DD"`
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || Cmip6Error::InvalidSettings {
            message: format!("'{}' is not a YYYY[-MM[-DD]] time bound", text),
        };
        let trimmed = text.trim();
        let mut fields = trimmed.split('-');
        let year = fields
            .next()
            .and_then(|y| y.parse::<i32>().ok())
            .ok_or_else(invalid)?;
        let month = fields
            .next()
            .map(|m| m.parse::<u32>().ok().filter(|m| (1..=12).contains(m)).ok_or_else(invalid))
            .transpose()?;
        let day = fields
            .next()
            .map(|d| d.parse::<u32>().ok().filter(|d| (1..=31).contains(d)).ok_or_else(invalid))
            .transpose()?;
        if fields.next().is_some() {
            return Err(invalid());
        }
        Ok(Self {
            year,
            month,
            day,
            label: trimmed.to_string(),
        })
    }

    /// Builds a bound from a JSON year (integral floats included) or string
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Number(n) => {
                let year = n
                    .as_i64()
                    .or_else(|| {
                        n.as_f64()
                            .filter(|y| y.fract() == 0.0 && y.abs() <= f64::from(i32::MAX))
                            .map(|y| y as i64)
                    })
                    .and_then(|y| i32::try_from(y).ok())
                    .ok_or_else(|| Cmip6Error::InvalidSettings {
                        message: format!("time bound {} is not an integer year", n),
                    })?;
                Ok(Self {
                    year,
                    month: None,
                    day: None,
                    label: n.to_string(),
                })
            }
            JsonValue::String(s) => Self::parse(s),
            other => Err(Cmip6Error::InvalidSettings {
                message: format!("time bound {} must be a year or date string", other),
            }),
        }
    }

    fn first_day(&self) -> CalendarDate {
        CalendarDate::new(self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))
    }

    fn last_day(&self) -> CalendarDate {
        CalendarDate::new(self.year, self.month.unwrap_or(12), self.day.unwrap_or(31))
    }
}

/// Inclusive time selection between two partial-date bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub start: TimeBound,
    pub end: TimeBound,
}

impl TimeRange {
    pub fn new(start: TimeBound, end: TimeBound) -> Result<Self> {
        if start.first_day().cmp(&end.last_day()) == Ordering::Greater {
            return Err(Cmip6Error::InvalidSettings {
                message: format!("time range {}..{} ends before it starts", start.label, end.label),
            });
        }
        Ok(Self { start, end })
    }

    /// Whether a date falls inside the range at the resolution of the bounds
    pub fn contains(&self, date: CalendarDate) -> bool {
        date >= self.start.first_day() && date <= self.end.last_day()
    }

    /// Index range `[first, last + 1)` of the encoded time values inside the range
    ///
    /// Returns `None` when no value falls inside. Values must be monotonically
    /// increasing, as CMIP6 time coordinates are.
    pub fn index_range(&self, units: &TimeUnits, values: &[f64]) -> Result<Option<(usize, usize)>> {
        let mut first = None;
        let mut last = None;
        for (i, &value) in values.iter().enumerate() {
            if self.contains(units.decode(value)?) {
                first.get_or_insert(i);
                last = Some(i);
            }
        }
        Ok(first.zip(last).map(|(f, l)| (f, l + 1)))
    }
}
