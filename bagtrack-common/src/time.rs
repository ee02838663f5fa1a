//! Timestamp utilities
//!
//! All timestamps are stored as RFC 3339 text with microsecond precision and a
//! `Z` suffix, so lexical order in SQLite matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp, truncated to the stored precision
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    parse_db_timestamp(&to_db_string(&now)).unwrap_or(now)
}

/// Format a timestamp for storage
pub fn to_db_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[tokio::test]
    async fn test_now_successive_calls_advance() {
        let time1 = now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let time2 = now();
        assert!(time2 > time1);
    }

    #[test]
    fn test_db_string_sorts_chronologically() {
        let earlier = parse_db_timestamp("2025-01-15T09:05:00.000001Z").unwrap();
        let later = parse_db_timestamp("2025-01-15T10:00:00Z").unwrap();
        assert!(to_db_string(&earlier) < to_db_string(&later));
    }

    #[test]
    fn test_now_survives_storage_format() {
        let ts = now();
        let stored = to_db_string(&ts);
        assert_eq!(parse_db_timestamp(&stored).unwrap(), ts);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_db_timestamp("yesterday").is_err());
    }
}
