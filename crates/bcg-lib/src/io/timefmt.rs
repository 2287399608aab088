//! Conversion between epoch milliseconds and formatted timestamp strings.
//!
//! The formatted representation (`YYYY/MM/DD HH:MM:SS`, UTC) carries whole
//! seconds only. Formatting truncates the millisecond remainder, which is
//! exactly the granularity alignment the synchronizer relies on: both rate
//! series must land on whole-second timestamps before exact matching.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime};

pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
const TIMESTAMP_FORMAT_DASHED: &str = "%Y-%m-%d %H:%M:%S";

/// Format epoch milliseconds as `YYYY/MM/DD HH:MM:SS` (UTC), dropping the
/// sub-second part.
pub fn format_ms(ms: i64) -> Result<String> {
    let dt = DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow!("timestamp {ms} ms is out of the representable range"))?;
    Ok(dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Parse a formatted timestamp back to epoch milliseconds (always a
/// whole-second multiple). Accepts `/`- and `-`-separated dates, since
/// reference exports differ on the separator.
pub fn parse_to_ms(text: &str) -> Result<i64> {
    let trimmed = text.trim();
    let parsed = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT_DASHED))
        .with_context(|| format!("'{trimmed}' is not a {TIMESTAMP_FORMAT} timestamp"))?;
    Ok(parsed.and_utc().timestamp_millis())
}
