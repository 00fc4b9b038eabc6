//! Timestamp utilities
//!
//! Timestamps are persisted as fixed-precision RFC 3339 strings so that
//! lexicographic comparison in SQL matches chronological order.

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp, truncated to the stored precision
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Format a timestamp for storage (microsecond precision, `Z` suffix)
pub fn to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn from_db(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

/// Parse an optional stored timestamp
pub fn from_db_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(from_db).transpose()
}

/// Format a calendar date for storage (`YYYY-MM-DD`)
pub fn date_to_db(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // After 2000-01-01, before 2100-01-01
        assert!(timestamp.timestamp() > 946_684_800);
        assert!(timestamp.timestamp() < 4_102_444_800);
    }

    #[test]
    fn test_db_format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1_500);
        assert_eq!(to_db(&a), "2025-03-01T09:00:00.000000Z");
        assert_eq!(to_db(&b), "2025-03-01T09:00:00.001500Z");
        assert!(to_db(&a) < to_db(&b));
    }

    #[test]
    fn test_db_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(from_db(&to_db(&ts)).unwrap(), ts);
    }

    #[test]
    fn test_from_db_rejects_garbage() {
        assert!(from_db("yesterday").is_err());
        assert_eq!(from_db_opt(None).unwrap(), None);
    }

    #[test]
    fn test_date_to_db() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        assert_eq!(date_to_db(&date), "2025-01-07");
    }
}
