//! High-precision manifest timestamp codec.
//!
//! The scanner stamps every record with `YYYY-MM-DD HH:MM:SS.fffffffff +ZZZZ`
//! (nine fractional digits). Readers only keep millisecond precision; the
//! literal `-` (or an empty column) stands for "unknown".

use chrono::{DateTime, FixedOffset, Timelike};

use crate::error::{ManifestError, ManifestResult};

/// Parse format: flexible fractional width so that hand-written fixtures with
/// fewer than nine digits still parse.
const PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

/// Emit format: exactly nine fractional digits.
const EMIT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f %z";

/// Column value denoting an unknown timestamp.
pub const UNKNOWN_TIME: &str = "-";

/// Parse a manifest timestamp column.
///
/// Returns `None` for the unknown marker `-` and for an empty column. The
/// parsed instant is truncated to millisecond precision, which is all the
/// scheduler index keeps.
///
/// # Errors
///
/// Returns [`ManifestError::BadFileTime`] if the column is present but does
/// not match the manifest timestamp format.
pub fn parse_file_time(value: &str) -> ManifestResult<Option<DateTime<FixedOffset>>> {
    let value = value.trim();
    if value.is_empty() || value == UNKNOWN_TIME {
        return Ok(None);
    }
    let parsed = DateTime::parse_from_str(value, PARSE_FORMAT).map_err(|source| {
        ManifestError::BadFileTime {
            value: value.to_owned(),
            source,
        }
    })?;
    Ok(Some(truncate_to_millis(parsed)))
}

/// Format a manifest timestamp column, nine fractional digits.
#[must_use]
pub fn format_file_time(time: Option<&DateTime<FixedOffset>>) -> String {
    match time {
        Some(t) => t.format(EMIT_FORMAT).to_string(),
        None => UNKNOWN_TIME.to_owned(),
    }
}

fn truncate_to_millis(time: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let millis = time.nanosecond() / 1_000_000;
    // with_nanosecond only fails on leap-second values above 2^30, which a
    // division by 10^6 can never produce.
    time.with_nanosecond(millis * 1_000_000).unwrap_or(time)
}
