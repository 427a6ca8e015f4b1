use chrono::{DateTime, Duration, Utc};

pub fn hours(h: u64) -> Duration {
    Duration::hours(h as i64)
}

/// Unix seconds from the provider to a UTC timestamp; `0` means "no expiry".
pub fn expiry_from_unix(ts: i64) -> Option<DateTime<Utc>> {
    if ts <= 0 {
        return None;
    }
    DateTime::from_timestamp(ts, 0)
}
