//! Timestamp encoding shared by every table.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings in UTC with
//! microsecond precision, so lexical order in SQLite equals time order.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Encode a timestamp for storage.
pub fn encode(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp.
pub fn decode(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

/// Unix seconds, used where a numeric range filter is needed.
pub fn epoch_seconds(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp()
}

/// Start of a window reaching `days` back from now.
///
/// `None` when the window runs past chrono's range; callers treat that as
/// no lower bound at all. Negative spans count as zero.
pub fn days_before_now(days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days.max(0)).and_then(|span| crate::now().checked_sub_signed(span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_encode_round_trips() {
        let ts = Utc.with_ymd_and_hms(2024, 7, 19, 21, 4, 5).unwrap();
        let raw = encode(&ts);
        assert_eq!(raw, "2024-07-19T21:04:05.000000Z");
        assert_eq!(decode(&raw).unwrap(), ts);
    }

    #[test]
    fn test_encoding_sorts_lexically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
        let later = earlier + Duration::milliseconds(1500);
        assert!(encode(&earlier) < encode(&later));
    }

    #[test]
    fn test_days_before_now_saturates_to_unbounded() {
        let week = days_before_now(7).unwrap();
        assert!(week < crate::now());
        assert!(days_before_now(-3).unwrap() <= crate::now());

        assert!(days_before_now(1_000_000_000).is_none());
        assert!(days_before_now(i64::MAX).is_none());
    }
}
