//! Timestamp parsing and hour/duration conversions.
//!
//! Snapshots and CLI flags arrive in several shapes (Blazar's fractional
//! seconds, bare `YYYY-MM-DD HH:MM`, RFC 3339 with offsets). Everything is
//! normalized to `DateTime<Utc>`; naive inputs are read as UTC.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::error::{EngineError, EngineResult};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp into UTC.
pub fn parse_timestamp(input: &str) -> EngineResult<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidRequest("empty timestamp".to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(naive.and_utc());
        }
    }

    Err(EngineError::InvalidRequest(format!(
        "unrecognized timestamp format: {trimmed}"
    )))
}

/// Render a timestamp as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Convert fractional hours into a whole-second `Duration`.
pub fn hours(value: f64) -> EngineResult<Duration> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EngineError::InvalidDuration(value));
    }
    Duration::try_seconds((value * 3600.0).round() as i64).ok_or(EngineError::InvalidDuration(value))
}

/// `start + duration`, failing instead of overflowing the calendar range.
pub fn offset(start: DateTime<Utc>, duration: Duration) -> EngineResult<DateTime<Utc>> {
    start
        .checked_add_signed(duration)
        .ok_or_else(|| EngineError::InvalidDuration(duration.num_seconds() as f64 / 3600.0))
}

/// Lenient serde adapter for `DateTime<Utc>` fields.
pub mod lenient {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}
