//! Weekly time periods
//!
//! A period is a list of `[start, end)` ranges, in seconds of the day (UTC),
//! for each weekday starting with Sunday.

use chrono::{DateTime, Datelike, Timelike};
use serde::{Deserialize, Serialize};

use super::Timestamp;

const SECONDS_PER_DAY: u32 = 86_400;

/// A `[start, end)` range in seconds since midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u32,
    pub end: u32,
}

impl TimeRange {
    pub fn new(start: u32, end: u32) -> Result<Self, String> {
        if start > end || end > SECONDS_PER_DAY {
            return Err(format!("invalid time range {}-{}", start, end));
        }
        Ok(Self { start, end })
    }

    /// Parse `"HH:MM-HH:MM"` (`24:00` is accepted as end of day)
    pub fn parse(text: &str) -> Result<Self, String> {
        let (start, end) = text
            .split_once('-')
            .ok_or_else(|| format!("invalid time range '{}'", text))?;
        Self::new(parse_clock(start)?, parse_clock(end)?)
    }

    pub fn contains(&self, second_of_day: u32) -> bool {
        second_of_day >= self.start && second_of_day < self.end
    }
}

fn parse_clock(text: &str) -> Result<u32, String> {
    let (hours, minutes) = text
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("invalid clock time '{}'", text))?;
    let hours: u32 = hours
        .parse()
        .map_err(|_| format!("invalid hour in '{}'", text))?;
    let minutes: u32 = minutes
        .parse()
        .map_err(|_| format!("invalid minute in '{}'", text))?;
    if minutes >= 60 || hours > 24 || (hours == 24 && minutes != 0) {
        return Err(format!("clock time out of range '{}'", text));
    }
    Ok(hours * 3600 + minutes * 60)
}

/// Named weekly schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriod {
    pub name: String,
    pub alias: String,
    /// Index 0 is Sunday
    pub days: [Vec<TimeRange>; 7],
}

impl TimePeriod {
    /// Empty period (never active)
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            days: Default::default(),
        }
    }

    /// Period covering every second of every day
    pub fn always(name: impl Into<String>) -> Self {
        let mut period = Self::new(name);
        for day in period.days.iter_mut() {
            day.push(TimeRange {
                start: 0,
                end: SECONDS_PER_DAY,
            });
        }
        period
    }

    /// Add a range to one weekday (0 = Sunday)
    pub fn with_range(mut self, weekday: usize, range: TimeRange) -> Self {
        if let Some(day) = self.days.get_mut(weekday) {
            day.push(range);
        }
        self
    }

    /// Whether the timestamp falls inside the period
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        let Some(moment) = DateTime::from_timestamp(timestamp, 0) else {
            return false;
        };
        let weekday = moment.weekday().num_days_from_sunday() as usize;
        let second_of_day = moment.num_seconds_from_midnight();
        self.days[weekday]
            .iter()
            .any(|range| range.contains(second_of_day))
    }
}

/// Parse a weekday name into its Sunday-based index
pub fn weekday_index(name: &str) -> Option<usize> {
    match name.to_ascii_lowercase().as_str() {
        "sunday" | "sun" => Some(0),
        "monday" | "mon" => Some(1),
        "tuesday" | "tue" => Some(2),
        "wednesday" | "wed" => Some(3),
        "thursday" | "thu" => Some(4),
        "friday" | "fri" => Some(5),
        "saturday" | "sat" => Some(6),
        _ => None,
    }
}
