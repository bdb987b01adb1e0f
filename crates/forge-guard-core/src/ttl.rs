//! TTL parsing for the status-cleanup labels.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Error parsing a duration-valued label.
#[derive(Debug, Error)]
pub enum TtlError {
    #[error("invalid duration '{value}': {source}")]
    InvalidDuration {
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("duration '{0}' out of range")]
    OutOfRange(String),
}

/// Parse a duration label value such as `24h`, `30m` or `1h30m`.
pub fn parse_ttl(value: &str) -> Result<Duration, TtlError> {
    let std = humantime::parse_duration(value).map_err(|source| TtlError::InvalidDuration {
        value: value.to_string(),
        source,
    })?;
    Duration::from_std(std).map_err(|_| TtlError::OutOfRange(value.to_string()))
}

/// Whether `since + ttl` lies before `now`.
pub fn ttl_expired(ttl: &str, since: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool, TtlError> {
    Ok(now > since + parse_ttl(ttl)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_ttl_formats() {
        assert_eq!(parse_ttl("24h").unwrap(), Duration::hours(24));
        assert_eq!(parse_ttl("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_ttl("1h30m").unwrap(), Duration::minutes(90));
        assert!(parse_ttl("soon").is_err());
        assert!(parse_ttl("").is_err());
    }

    #[test]
    fn test_ttl_expired() {
        let since = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let before = since + Duration::minutes(29);
        let after = since + Duration::minutes(31);
        assert!(!ttl_expired("30m", since, before).unwrap());
        assert!(ttl_expired("30m", since, after).unwrap());
    }

    #[test]
    fn test_ttl_expired_is_idempotent_under_same_clock() {
        let since = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let now = since + Duration::hours(2);
        let first = ttl_expired("1h", since, now).unwrap();
        let second = ttl_expired("1h", since, now).unwrap();
        assert_eq!(first, second);
    }
}
