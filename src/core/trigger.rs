//! Recurrence calculation.
//!
//! A [`Trigger`] computes the next due time for a job from an anchor
//! time, a fixed interval, and an optional repetition limit. Intervals
//! are configured from human-readable duration strings such as
//! `"1h30m"`, `"15m"`, or `"250ms"`.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when configuring a trigger.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The interval string could not be parsed.
    #[error("invalid interval expression: {0}")]
    InvalidInterval(String),
}

/// The recurrence schedule for a job.
///
/// A zero interval means the trigger is never due. A positive limit
/// caps the number of occurrences: once reached, [`Trigger::next`]
/// keeps returning the final occurrence, which the owning job consumes
/// at most once.
#[derive(Debug, Clone)]
pub struct Trigger {
    /// Fixed recurrence interval. Zero means "never due".
    interval: Duration,
    /// Reference point from which occurrences are counted.
    anchor: DateTime<Utc>,
    /// Maximum number of occurrences. Zero means unlimited.
    limit: u64,
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger {
    /// Create a trigger with a zero interval, anchored at the current
    /// time, with no repetition limit.
    pub fn new() -> Self {
        Self {
            interval: Duration::ZERO,
            anchor: Utc::now(),
            limit: 0,
        }
    }

    /// Set the recurrence interval from a duration string.
    ///
    /// Supported units are `ms`, `s`, `m`, `h`, and `d`, and terms may
    /// be concatenated (`"1h30m"`). A leading `-` is accepted but the
    /// interval clamps to zero, making the trigger never due. An
    /// unparsable string is a configuration error.
    pub fn every(&mut self, spec: &str) -> Result<&mut Self, TriggerError> {
        self.interval = parse_duration(spec)?;
        Ok(self)
    }

    /// Cap the number of occurrences. Zero or negative means unlimited.
    pub fn limit(&mut self, n: i64) -> &mut Self {
        self.limit = if n < 0 { 0 } else { n as u64 };
        self
    }

    /// Set the anchor time from which the recurrence is counted.
    pub fn starting_at(&mut self, anchor: DateTime<Utc>) -> &mut Self {
        self.anchor = anchor;
        self
    }

    /// Get the configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Get the anchor time.
    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    /// Get the repetition limit (zero means unlimited).
    pub fn repeat_limit(&self) -> u64 {
        self.limit
    }

    /// Compute the next occurrence at or after `now`.
    ///
    /// Returns `None` when the interval is zero. Otherwise, starting
    /// from `anchor + interval`, the interval is added until the
    /// candidate is no longer strictly before `now`. If a positive
    /// limit is reached first, the final occurrence is returned as a
    /// (possibly past) permanent due time; the owning job's watermark
    /// ensures it fires at most once.
    pub fn next(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.interval.is_zero() {
            return None;
        }
        let step = chrono::Duration::from_std(self.interval).ok()?;
        let mut next = self.anchor.checked_add_signed(step)?;
        let mut occurrences: u64 = 0;
        while next < now {
            occurrences += 1;
            if self.limit > 0 && occurrences >= self.limit {
                return Some(next);
            }
            next = next.checked_add_signed(step)?;
        }
        Some(next)
    }
}

/// Parse a duration string like `"5m"`, `"1h30m"`, or `"250ms"`.
fn parse_duration(spec: &str) -> Result<Duration, TriggerError> {
    let invalid = || TriggerError::InvalidInterval(spec.to_string());

    let (negative, body) = match spec.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, spec),
    };
    if body.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut chars = body.chars().peekable();
    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.peek().copied() {
            if c.is_ascii_digit() {
                digits.push(c);
                chars.next();
            } else {
                break;
            }
        }
        let mut unit = String::new();
        while let Some(c) = chars.peek().copied() {
            if c.is_ascii_alphabetic() {
                unit.push(c);
                chars.next();
            } else {
                break;
            }
        }

        let value: u64 = digits.parse().map_err(|_| invalid())?;
        let term = match unit.as_str() {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
            "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
            "d" => Duration::from_secs(value.checked_mul(86400).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        };
        total = total.checked_add(term).ok_or_else(invalid)?;
    }

    // Negative durations clamp to zero: the trigger is never due.
    if negative {
        return Ok(Duration::ZERO);
    }
    Ok(total)
}
