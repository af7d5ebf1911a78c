use chrono::{DateTime, Duration, Local, NaiveDateTime};

/// Format used for queue timestamps and command keys (local time, microsecond precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Returns the current local time as an ISO 8601 timestamp.
pub fn timestamp_now() -> String {
    format_timestamp(Local::now())
}

pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Human-readable stamp used in sync commit messages.
pub fn commit_stamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Returns the timestamp one microsecond after `ts`, or `None` if `ts` does not
/// parse. Used to keep command keys unique within a single clock tick.
pub fn next_tick(ts: &str) -> Option<String> {
    let parsed = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()?;
    let bumped = parsed + Duration::microseconds(1);
    Some(bumped.format(TIMESTAMP_FORMAT).to_string())
}
