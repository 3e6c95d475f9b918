use chrono::{DateTime, NaiveDate, Utc};

/// Current Unix time in milliseconds.
pub fn current_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parse a user or model supplied deadline into a calendar date.
///
/// Accepts `YYYY-MM-DD` and full RFC 3339 timestamps.
pub fn parse_deadline(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
}

/// Format a date the way the Tasks API expects its `due` field.
pub fn to_due_timestamp(date: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"))
}
