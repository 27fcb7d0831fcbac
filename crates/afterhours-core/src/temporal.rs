//! Time-of-day activity model (the "Afterhours Protocol").
//!
//! Converts local wall-clock time into a multiplier on the scheduler's base
//! interval. Lower multipliers mean more frequent activity. Late at night
//! the afterhours table applies, which keeps the channels busy while the
//! standard table would quiet them down.

use std::time::Duration;

use chrono::{Datelike, Timelike, Weekday};

/// Hourly multipliers outside afterhours, index = local hour.
const STANDARD: [f64; 24] = [
    2.5, 2.5, 2.5, 2.5, 2.2, 2.0, // 00-05
    1.6, 1.3, 1.1, 1.0, 0.9, 0.9, // 06-11
    0.8, 0.9, 1.0, 1.0, 0.9, 0.8, // 12-17
    0.7, 0.6, 0.6, 0.7, 0.9, 1.2, // 18-23
];

/// Hourly multipliers during afterhours, index = local hour.
const AFTERHOURS: [f64; 24] = [
    0.5, 0.5, 0.6, 0.7, 0.8, 1.0, // 00-05
    1.4, 1.3, 1.1, 1.0, 0.9, 0.9, // 06-11
    0.8, 0.9, 1.0, 1.0, 0.9, 0.8, // 12-17
    0.7, 0.6, 0.6, 0.6, 0.5, 0.4, // 18-23
];

/// Whether `now` (local time) falls in the afterhours window.
///
/// Weekends: 22:00 to 06:00. Weekdays: 23:00 to 05:00. The early-morning
/// part belongs to the calendar day it falls on, so Saturday 01:00 is a
/// weekend hour.
pub fn is_afterhours<T: Datelike + Timelike>(now: &T) -> bool {
    let hour = now.hour();
    let weekend = matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
    if weekend {
        hour >= 22 || hour < 6
    } else {
        hour >= 23 || hour < 5
    }
}

/// Interval multiplier for `now`, roughly in `[0.4, 2.5]`.
///
/// With the protocol disabled the standard table always applies.
pub fn activity_multiplier<T: Datelike + Timelike>(now: &T, protocol_enabled: bool) -> f64 {
    let table = if protocol_enabled && is_afterhours(now) {
        &AFTERHOURS
    } else {
        &STANDARD
    };
    let hour = usize::try_from(now.hour()).unwrap_or(0);
    table.get(hour).copied().unwrap_or(1.0)
}

/// `round(base * multiplier)`, never negative.
pub fn adjusted_interval(base: Duration, multiplier: f64) -> Duration {
    #[allow(clippy::cast_precision_loss)]
    let scaled = (base.as_millis() as f64 * multiplier).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        return Duration::ZERO;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Duration::from_millis(scaled as u64)
}

/// Effective DM trigger probability (percent).
///
/// During afterhours the base is multiplied and capped at `cap`, but never
/// lowered below the base: the cap bounds the boost, not the configured
/// value, so a base of 80 stays 80. A base of 0 stays 0.
pub fn dm_probability(base: u8, afterhours: bool, multiplier: f64, cap: u8) -> u8 {
    if !afterhours || base == 0 {
        return base;
    }
    let boosted = (f64::from(base) * multiplier).round().min(f64::from(cap));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let boosted = boosted.max(0.0) as u8;
    boosted.max(base)
}
