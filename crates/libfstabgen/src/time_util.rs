//! Timespan parsing.
//!
//! Accepts the decorated numeric-with-unit syntax used throughout the
//! system: a bare number is seconds, otherwise each component carries a
//! unit suffix (`"30"`, `"1min"`, `"1min 30s"`, `"1min30s"`). Internal
//! resolution is microseconds.

use std::time::Duration;

pub const USEC_PER_SEC: u64 = 1_000_000;

/// Unit suffixes and their microsecond multipliers. Longer spellings come
/// first so that e.g. "minutes" is not consumed as "m" + garbage.
const SUFFIXES: &[(&str, u64)] = &[
    ("seconds", USEC_PER_SEC),
    ("second", USEC_PER_SEC),
    ("minutes", 60 * USEC_PER_SEC),
    ("minute", 60 * USEC_PER_SEC),
    ("hours", 3_600 * USEC_PER_SEC),
    ("hour", 3_600 * USEC_PER_SEC),
    ("days", 86_400 * USEC_PER_SEC),
    ("day", 86_400 * USEC_PER_SEC),
    ("weeks", 7 * 86_400 * USEC_PER_SEC),
    ("week", 7 * 86_400 * USEC_PER_SEC),
    ("usec", 1),
    ("msec", 1_000),
    ("sec", USEC_PER_SEC),
    ("min", 60 * USEC_PER_SEC),
    ("hr", 3_600 * USEC_PER_SEC),
    ("ms", 1_000),
    ("us", 1),
    ("s", USEC_PER_SEC),
    ("m", 60 * USEC_PER_SEC),
    ("h", 3_600 * USEC_PER_SEC),
    ("d", 86_400 * USEC_PER_SEC),
    ("w", 7 * 86_400 * USEC_PER_SEC),
];

/// Parse a timespan string into a [`Duration`]. Returns `None` for empty
/// or malformed input.
pub fn parse_sec(s: &str) -> Option<Duration> {
    let mut rest = s.trim();
    if rest.is_empty() {
        return None;
    }

    // Bare number: plain seconds.
    if let Ok(n) = rest.parse::<u64>() {
        return Some(Duration::from_secs(n));
    }

    let mut total_usec: u64 = 0;
    while !rest.is_empty() {
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return None;
        }
        let value: u64 = rest[..digits].parse().ok()?;
        rest = rest[digits..].trim_start();

        let (suffix, multiplier) = SUFFIXES
            .iter()
            .find(|(suffix, _)| rest.starts_with(suffix))?;
        total_usec = total_usec.checked_add(value.checked_mul(*multiplier)?)?;
        rest = rest[suffix.len()..].trim_start();
    }

    Some(Duration::from_micros(total_usec))
}
