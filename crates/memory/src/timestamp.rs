//! Timestamp normalisation.
//!
//! Memories arrive from several stores with timestamps in whatever shape the
//! store kept them: RFC 3339 strings, bare dates, Unix seconds, Unix millis,
//! or native `DateTime<Utc>` values.  Everything is normalised to ISO-8601
//! with millisecond precision (`2024-05-01T12:00:00.000Z`) before scoring.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Numeric timestamps below this magnitude are Unix seconds; at or above it
/// they are Unix milliseconds.
pub const UNIX_SECONDS_CUTOFF: f64 = 10_000_000_000.0;

/// A timestamp in any of the accepted input shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Unix(f64),
    Date(DateTime<Utc>),
    Iso(String),
}

impl Timestamp {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self::Date(at)
    }

    /// Resolve to a UTC instant truncated to millisecond precision.
    pub fn to_datetime(&self) -> Result<DateTime<Utc>, MemoryError> {
        let at = match self {
            Self::Date(at) => *at,
            Self::Unix(value) => from_unix(*value)?,
            Self::Iso(raw) => parse_iso(raw)?,
        };
        truncate_to_millis(at).ok_or_else(|| MemoryError::InvalidTimestamp {
            value: self.to_string(),
            reason: "out of range".to_string(),
        })
    }

    /// Normalised ISO-8601 string with millisecond precision.
    pub fn to_iso(&self) -> Result<String, MemoryError> {
        Ok(format_iso(self.to_datetime()?))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(value) => write!(f, "{value}"),
            Self::Date(at) => write!(f, "{}", format_iso(*at)),
            Self::Iso(raw) => f.write_str(raw),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self::Date(at)
    }
}

impl From<&str> for Timestamp {
    fn from(raw: &str) -> Self {
        Self::Iso(raw.to_string())
    }
}

impl From<String> for Timestamp {
    fn from(raw: String) -> Self {
        Self::Iso(raw)
    }
}

/// Render an instant the way every timestamp in this crate is rendered.
pub fn format_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a clock value (as produced by a `nowIso` collaborator).
pub fn parse_now(now_iso: &str) -> Result<DateTime<Utc>, MemoryError> {
    Timestamp::Iso(now_iso.to_string()).to_datetime()
}

/// Whole and fractional days from `then` to `now`, floored at zero.
pub fn age_days(now: DateTime<Utc>, then: DateTime<Utc>) -> f64 {
    let millis = (now - then).num_milliseconds().max(0);
    millis as f64 / 86_400_000.0
}

fn from_unix(value: f64) -> Result<DateTime<Utc>, MemoryError> {
    if !value.is_finite() {
        return Err(MemoryError::InvalidTimestamp {
            value: value.to_string(),
            reason: "non-finite unix time".to_string(),
        });
    }
    let millis = if value.abs() < UNIX_SECONDS_CUTOFF {
        (value * 1000.0).round()
    } else {
        value.round()
    };
    DateTime::from_timestamp_millis(millis as i64).ok_or_else(|| MemoryError::InvalidTimestamp {
        value: value.to_string(),
        reason: "unix time out of range".to_string(),
    })
}

fn parse_iso(raw: &str) -> Result<DateTime<Utc>, MemoryError> {
    let trimmed = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(at.with_timezone(&Utc));
    }
    // Zone-less date-times are taken as UTC.
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(MemoryError::InvalidTimestamp {
        value: raw.to_string(),
        reason: "not an ISO-8601 date or date-time".to_string(),
    })
}

fn truncate_to_millis(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(at.timestamp_millis())
}
