//! Wall-clock arithmetic for the session engine.
//!
//! All derived timer values are computed from absolute timestamps, never from
//! a decrementing counter, so a missed tick or a process restart cannot skew
//! the displayed time. These helpers are pure and carry no state.

use chrono::{DateTime, Duration, Utc};

/// Format a duration in seconds as `hh:mm:ss`, each field zero-padded.
///
/// Negative durations are not meaningful for a countdown display; callers
/// clamp to zero before formatting, and this function does the same.
pub fn seconds_to_clock(seconds: i64) -> String {
    let total = seconds.max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// Return `ts` shifted by `minutes`. Negative values shift backwards.
pub fn add_minutes(ts: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    ts + Duration::minutes(minutes)
}

/// Return `ts` shifted by `seconds`. Negative values shift backwards.
pub fn add_seconds(ts: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    ts + Duration::seconds(seconds)
}

/// Whole seconds from `a` to `b`, floored. Positive when `b` is after `a`.
pub fn seconds_between(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    (b - a).num_milliseconds().div_euclid(1000)
}

/// Whole seconds from `a` to `b`, rounded up. Positive when `b` is after `a`.
///
/// A countdown computed this way shows the last whole second before flipping
/// to zero, which is what users expect from a ticking display.
pub fn seconds_between_ceil(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    let ms = (b - a).num_milliseconds();
    ms.div_euclid(1000) + i64::from(ms.rem_euclid(1000) > 0)
}
