//! Pull-time handling.
//!
//! The crawler stamps every page with a naive local time formatted as
//! `YY-MM-DD-HH-MM-SS`. The same format is used for the persisted watermark,
//! and every date stored on an entity row is a second-precision
//! [`NaiveDateTime`].

use chrono::{NaiveDate, NaiveDateTime, Timelike};

/// Second-precision naive local time used for pull times and entity dates.
pub type Timestamp = NaiveDateTime;

/// `strftime` pattern of the crawler's `PullTime` field and of the watermark file.
pub const PULL_TIME_FORMAT: &str = "%y-%m-%d-%H-%M-%S";

/// Watermark value before any snapshot has been applied (1970-01-01 00:00:00).
pub fn epoch() -> Timestamp {
    NaiveDateTime::default()
}

/// `sold_out_date` stored for events that are not sold out (2019-04-12 00:00:01).
pub fn never_sold_out() -> Timestamp {
    NaiveDate::from_ymd_opt(2019, 4, 12)
        .and_then(|d| d.and_hms_opt(0, 0, 1))
        .expect("2019-04-12 00:00:01 is a valid date-time")
}

/// Current local wall-clock time, truncated to whole seconds.
pub fn now() -> Timestamp {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Parses a `YY-MM-DD-HH-MM-SS` pull time.
pub fn parse_pull_time(value: &str) -> Result<Timestamp, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), PULL_TIME_FORMAT)
}

/// Formats a timestamp as `YY-MM-DD-HH-MM-SS`.
pub fn format_pull_time(ts: Timestamp) -> String {
    ts.format(PULL_TIME_FORMAT).to_string()
}

/// Parses an API local date-time such as `2019-06-01T19:00:00`.
///
/// A space separator is accepted as well.
pub fn parse_local(value: &str) -> Result<Timestamp, chrono::ParseError> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
}

/// Parses the API `published` field, which carries a UTC suffix.
///
/// Only the first 19 characters (`YYYY-MM-DDTHH:MM:SS`) are significant.
pub fn parse_published(value: &str) -> Result<Timestamp, chrono::ParseError> {
    let value = value.trim();
    parse_local(value.get(..19).unwrap_or(value))
}
