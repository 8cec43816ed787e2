//! Instants on the wire and the clock that produces "now".
//!
//! Every timestamp the service accepts or emits goes through
//! [`parse_instant`] / [`format_instant`], so stored values and response
//! values always agree at millisecond precision.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};

/// Parse a UTC timestamp of the form `YYYY-MM-DDTHH:MM:SS[.fff...]Z` and
/// truncate it to millisecond precision.
///
/// Offsets other than `Z`, lowercase designators, surrounding whitespace,
/// a space separator and leap seconds are all rejected.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if !has_utc_shape(raw.as_bytes()) {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ")
        .ok()
        .map(|dt| dt.and_utc().trunc_subsecs(3))
}

fn has_utc_shape(b: &[u8]) -> bool {
    const DIGITS: [usize; 14] = [0, 1, 2, 3, 5, 6, 8, 9, 11, 12, 14, 15, 17, 18];

    if b.len() < 20 || b[b.len() - 1] != b'Z' {
        return false;
    }
    if !DIGITS.iter().all(|&i| b[i].is_ascii_digit()) {
        return false;
    }
    if b[4] != b'-' || b[7] != b'-' || b[10] != b'T' || b[13] != b':' || b[16] != b':' {
        return false;
    }
    // No leap seconds.
    if b[17] > b'5' {
        return false;
    }

    match &b[19..b.len() - 1] {
        [] => true,
        [b'.', frac @ ..] => !frac.is_empty() && frac.iter().all(u8::is_ascii_digit),
        _ => false,
    }
}

/// Render an instant as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds since the Unix epoch, the storage representation.
pub fn to_epoch_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

// ── Clock ───────────────────────────────────────────────────────────

/// Source of the current instant.
///
/// Injected into the service so tests can pin "now" without touching the
/// caller-supplied reference override.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

/// A clock stuck at one instant. Used for testing.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ── TimeSource ──────────────────────────────────────────────────────

/// Configured origin of "now". Only the system clock is supported; the
/// label is reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeSource {
    #[default]
    System,
}

impl TimeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
        }
    }

    /// Build the clock this source describes.
    pub fn clock(&self) -> Arc<dyn Clock> {
        match self {
            Self::System => Arc::new(SystemClock),
        }
    }
}

impl fmt::Display for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            other => Err(format!("unsupported time source '{other}' (expected 'system')")),
        }
    }
}
