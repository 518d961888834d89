//! Timestamp normalization for provider dates.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeZone};
use thiserror::Error;

/// The timestamp could not be read as ISO-8601.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid timestamp {input:?}: {reason}")]
pub struct DateParseError {
    pub input: String,
    pub reason: String,
}

/// Offset-bearing layouts RFC 3339 rejects (no seconds).
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M%:z"];

/// Layouts without an offset, tried in order.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

static LOCAL_OFFSET: OnceLock<FixedOffset> = OnceLock::new();

/// Local UTC offset, captured on first use and fixed for the process lifetime.
pub fn local_offset() -> FixedOffset {
    *LOCAL_OFFSET.get_or_init(|| Local::now().offset().fix())
}

/// Parse an ISO-8601 timestamp and convert it to the process-local offset.
pub fn parse_timestamp(input: &str) -> Result<DateTime<FixedOffset>, DateParseError> {
    parse_timestamp_in(input, local_offset())
}

/// Parse an ISO-8601 timestamp and convert it to `offset`.
///
/// A trailing `Z` means UTC. Seconds are optional, and the date and time may
/// be separated by `T` or a space. Date-times without any offset, and bare
/// dates (midnight), are taken to be in `offset` already.
pub fn parse_timestamp_in(
    input: &str,
    offset: FixedOffset,
) -> Result<DateTime<FixedOffset>, DateParseError> {
    let trimmed = input.trim();
    let normalized = match trimmed.strip_suffix('Z') {
        Some(rest) => format!("{}+00:00", rest),
        None => trimmed.to_string(),
    };

    let rfc_err = match DateTime::parse_from_rfc3339(&normalized) {
        Ok(parsed) => return Ok(parsed.with_timezone(&offset)),
        Err(err) => err,
    };
    let invalid = |reason: String| DateParseError {
        input: input.to_string(),
        reason,
    };

    if let Some(parsed) = OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(&normalized, format).ok())
    {
        return Ok(parsed.with_timezone(&offset));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| invalid(rfc_err.to_string()))?;

    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| invalid("ambiguous local time".to_string()))
}
