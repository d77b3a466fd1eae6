//! Timestamp utilities for log records and timestamped file names.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Format used in file and directory names. Sorts lexicographically in
/// chronological order.
const FILE_STAMP_FORMAT: &str = "%Y%m%d-%H%M%S%.3f";

/// Returns the current UTC time as an RFC 3339 string with millisecond
/// precision, e.g. `2026-10-19T08:15:02.117Z`.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Renders a timestamp for use inside a file name, e.g. `20261019-081502.117`.
#[must_use]
pub fn file_stamp(at: Timestamp) -> String {
    at.format(FILE_STAMP_FORMAT).to_string()
}

/// Parses a stamp produced by [`file_stamp`].
///
/// Any suffix after the stamp (such as a `-1` collision counter) is ignored.
#[must_use]
pub fn parse_file_stamp(stamp: &str) -> Option<Timestamp> {
    // "YYYYmmdd-HHMMSS.fff" is 19 bytes
    let head = stamp.get(..19)?;
    NaiveDateTime::parse_from_str(head, FILE_STAMP_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
