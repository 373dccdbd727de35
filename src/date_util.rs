use chrono::{Duration, NaiveDate};

use crate::error::{Error, Result};

/// Parse an ISO-8601 date string (`YYYY-MM-DD`). Date pickers sometimes hand
/// over full timestamps, so a `T` suffix is tolerated and truncated.
pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    let date_part = s.split('T').next().unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| Error::DateParse(format!("not an ISO-8601 date: {s}")))
}

/// Number of calendar days in the inclusive range `[start, end]`.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

/// The date `k` days before today, as a `YYYY-MM-DD` key.
pub fn date_k_days_ago(k: i64) -> String {
    let d = chrono::Local::now().date_naive() - Duration::days(k);
    d.format("%Y-%m-%d").to_string()
}

/// Format a date as the warehouse's `YYYY-MM-DD` date key.
pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}
