//! Forge rate-limit detection from error strings.
//!
//! The forge reports rate limiting inside error messages rather than as a
//! structured field, in two shapes: a reset timestamp after `until `, or a
//! known invitation-rate-limit phrase that carries no timestamp at all and
//! gets a fixed one-hour backoff.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Backoff applied when the error carries no reset timestamp.
const INVITATION_BACKOFF_SECS: i64 = 3600;

fn until_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"until\s+([^,\]]+)").expect("static regex"))
}

/// Extract the rate-limit reset time from a forge error string.
///
/// Returns `Some(reset)` when the message is a rate-limit error. Messages
/// mentioning the organization invitation rate limit have no timestamp and
/// map to `now + 1h`; otherwise the timestamp after `until ` is parsed.
/// Returns `None` for anything that is not a rate-limit error.
#[must_use]
pub fn parse_rate_limit_reset(error: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if error.is_empty() {
        return None;
    }
    let lowered = error.to_lowercase();

    if lowered.contains("invitation rate limit") {
        return Some(now + chrono::Duration::seconds(INVITATION_BACKOFF_SECS));
    }

    if !lowered.contains("rate limit") || !lowered.contains("until ") {
        return None;
    }

    let captured = until_regex().captures(error)?.get(1)?.as_str().trim();
    parse_reset_timestamp(captured)
}

/// Parse the timestamp formats observed in forge error messages, e.g.
/// `2025-12-05 02:02:13 +0000 UTC` or an RFC 3339 string.
fn parse_reset_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    // Drop a trailing zone abbreviation ("UTC", "CET") the offset already covers.
    let trimmed = match raw.rsplit_once(' ') {
        Some((head, tail)) if tail.chars().all(|c| c.is_ascii_alphabetic()) => head,
        _ => raw,
    };

    if let Ok(ts) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S %z") {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    None
}
