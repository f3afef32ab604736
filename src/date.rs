//! Front matter date normalization. Post dates are reduced to the calendar
//! day they were written with (`YYYY-MM-DD`); time of day and zone offsets
//! are dropped rather than converted, so a post dated late in the evening in
//! one zone doesn't slide onto a neighboring day.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fmt;

/// The output format for normalized dates.
const DAY_FORMAT: &str = "%Y-%m-%d";

/// Naive date-time layouts, tried in order after RFC 3339.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Zoned layouts that aren't RFC 3339 (e.g., `2024-01-01 10:00:00 +0900`).
const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S%.f %z"];

/// Normalizes a front matter date value to an ISO-8601 calendar day.
pub fn normalize_date(value: &serde_yaml::Value) -> Result<String, DateError> {
    match value {
        serde_yaml::Value::String(s) => parse_day(s.trim())
            .map(|day| day.format(DAY_FORMAT).to_string())
            .ok_or_else(|| DateError::Unrecognized(s.clone())),
        other => Err(DateError::Unsupported(describe(other))),
    }
}

/// Parses the calendar day out of a date or date-time string.
pub fn parse_day(s: &str) -> Option<NaiveDate> {
    if let Ok(day) = NaiveDate::parse_from_str(s, DAY_FORMAT) {
        return Some(day);
    }
    if let Ok(date_time) = DateTime::parse_from_rfc3339(s) {
        return Some(date_time.naive_local().date());
    }
    if let Some(day) = ZONED_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(s, format).ok())
    {
        return Some(day.naive_local().date());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|date_time| date_time.date())
}

fn describe(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => "null".to_owned(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Sequence(_) => "a sequence".to_owned(),
        serde_yaml::Value::Mapping(_) => "a mapping".to_owned(),
    }
}

/// Represents a front matter date that couldn't be normalized.
#[derive(Debug, PartialEq)]
pub enum DateError {
    /// Returned when the value is a string in no supported layout.
    Unrecognized(String),

    /// Returned when the value isn't a string at all.
    Unsupported(String),
}

impl fmt::Display for DateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DateError::Unrecognized(s) => write!(f, "unrecognized date `{}`", s),
            DateError::Unsupported(s) => write!(f, "unsupported date value {}", s),
        }
    }
}

impl std::error::Error for DateError {}
