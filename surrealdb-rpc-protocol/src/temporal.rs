//! Datetime and duration values.
//!
//! Both are stored as signed whole seconds plus a nanosecond fraction in
//! `0..1_000_000_000`. A negative duration of 1.5s is `secs = -2,
//! nanos = 500_000_000`.

use crate::error::ParseError;
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A UTC instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Datetime {
    secs: i64,
    nanos: u32,
}

impl Datetime {
    /// Returns `None` if `nanos` is not below one second.
    pub fn new(secs: i64, nanos: u32) -> Option<Self> {
        (nanos < NANOS_PER_SEC).then_some(Self { secs, nanos })
    }

    pub fn now() -> Self {
        Utc::now().into()
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Converts to chrono, or `None` if the instant is outside chrono's range.
    pub fn to_chrono(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.secs, self.nanos)
    }

    /// RFC 3339 text, or `None` outside the years 1 to 9999.
    pub fn to_rfc3339(&self) -> Option<String> {
        self.to_chrono()
            .filter(|dt| (1..=9999).contains(&dt.year()))
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl From<DateTime<Utc>> for Datetime {
    fn from(dt: DateTime<Utc>) -> Self {
        // chrono encodes leap seconds as nanos >= 1s
        let nanos = dt.timestamp_subsec_nanos().min(NANOS_PER_SEC - 1);
        Self {
            secs: dt.timestamp(),
            nanos,
        }
    }
}

impl fmt::Display for Datetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}.{:09}", self.secs, self.nanos),
        }
    }
}

impl FromStr for Datetime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc).into())
            .map_err(|e| ParseError::InvalidDatetime {
                input: s.to_string(),
                reason: e.to_string(),
            })
    }
}

/// A signed span of time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Duration {
    secs: i64,
    nanos: u32,
}

const UNITS: &[(&str, i128)] = &[
    ("w", 7 * 86_400 * NANOS_PER_SEC as i128),
    ("d", 86_400 * NANOS_PER_SEC as i128),
    ("h", 3_600 * NANOS_PER_SEC as i128),
    ("m", 60 * NANOS_PER_SEC as i128),
    ("s", NANOS_PER_SEC as i128),
    ("ms", 1_000_000),
    ("us", 1_000),
    ("ns", 1),
];

impl Duration {
    /// Returns `None` if `nanos` is not below one second.
    pub fn new(secs: i64, nanos: u32) -> Option<Self> {
        (nanos < NANOS_PER_SEC).then_some(Self { secs, nanos })
    }

    pub fn from_secs(secs: i64) -> Self {
        Self { secs, nanos: 0 }
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    pub fn is_negative(&self) -> bool {
        self.secs < 0
    }

    /// Total length in nanoseconds.
    pub fn as_nanos(&self) -> i128 {
        self.secs as i128 * NANOS_PER_SEC as i128 + self.nanos as i128
    }

    /// Builds a duration from total nanoseconds, or `None` if the whole
    /// seconds do not fit in an `i64`.
    pub fn from_nanos(total: i128) -> Option<Self> {
        let secs = total.div_euclid(NANOS_PER_SEC as i128);
        let nanos = total.rem_euclid(NANOS_PER_SEC as i128) as u32;
        i64::try_from(secs).ok().map(|secs| Self { secs, nanos })
    }

    /// Converts to a std duration, or `None` if negative.
    pub fn to_std(&self) -> Option<std::time::Duration> {
        u64::try_from(self.secs)
            .ok()
            .map(|secs| std::time::Duration::new(secs, self.nanos))
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Self {
            secs: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            nanos: d.subsec_nanos(),
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.as_nanos();
        if total == 0 {
            return write!(f, "0ns");
        }
        if total < 0 {
            write!(f, "-")?;
        }
        let mut rest = total.unsigned_abs();
        for (unit, size) in UNITS {
            let size = *size as u128;
            let count = rest / size;
            if count > 0 {
                write!(f, "{}{}", count, unit)?;
                rest %= size;
            }
        }
        Ok(())
    }
}

impl FromStr for Duration {
    type Err = ParseError;

    /// Parses `1w2d3h4m5s6ms7us8ns`; also accepts `y` (365 days) and `µs`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidDuration(s.to_string());

        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        if body.is_empty() {
            return Err(invalid());
        }

        let mut total: i128 = 0;
        let mut chars = body.char_indices().peekable();
        while chars.peek().is_some() {
            let start = chars.peek().map(|(i, _)| *i).unwrap_or(body.len());
            let mut end = start;
            while let Some((i, c)) = chars.peek().copied() {
                if !c.is_ascii_digit() {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            if end == start {
                return Err(invalid());
            }
            let count: i128 = body[start..end].parse().map_err(|_| invalid())?;

            let unit_start = end;
            let mut unit_end = unit_start;
            while let Some((i, c)) = chars.peek().copied() {
                if c.is_ascii_digit() {
                    break;
                }
                unit_end = i + c.len_utf8();
                chars.next();
            }
            let size = match &body[unit_start..unit_end] {
                "y" => 365 * 86_400 * NANOS_PER_SEC as i128,
                "µs" => 1_000,
                unit => UNITS
                    .iter()
                    .find(|(name, _)| *name == unit)
                    .map(|(_, size)| *size)
                    .ok_or_else(invalid)?,
            };
            total = count
                .checked_mul(size)
                .and_then(|n| total.checked_add(n))
                .ok_or_else(invalid)?;
        }

        if negative {
            total = -total;
        }
        Self::from_nanos(total).ok_or_else(invalid)
    }
}
