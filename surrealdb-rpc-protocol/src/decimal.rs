//! Arbitrary-precision decimal values, carried as validated text.

use crate::error::ParseError;
use std::fmt;
use std::str::FromStr;

/// A decimal number in its textual form, e.g. `-12.50` or `1e-7`.
///
/// No arithmetic is performed; equality is textual.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal(String);

impl Decimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lossy conversion for display and JSON interop.
    pub fn to_f64(&self) -> Option<f64> {
        self.0.parse().ok()
    }
}

fn is_valid(s: &str) -> bool {
    let s = s.strip_prefix(['-', '+']).unwrap_or(s);
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    };
    let (int, frac) = match mantissa.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (mantissa, None),
    };
    let digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    let mantissa_ok = match frac {
        Some(frac) => (!int.is_empty() || !frac.is_empty()) && digits(int) && digits(frac),
        None => !int.is_empty() && digits(int),
    };
    let exponent_ok = match exponent {
        Some(exp) => {
            let exp = exp.strip_prefix(['-', '+']).unwrap_or(exp);
            !exp.is_empty() && digits(exp)
        }
        None => true,
    };
    mantissa_ok && exponent_ok
}

impl FromStr for Decimal {
    type Err = ParseError;

    /// Accepts an optional `dec` suffix, as the server writes decimals in text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.strip_suffix("dec").unwrap_or(s);
        if is_valid(text) {
            Ok(Self(text.to_string()))
        } else {
            Err(ParseError::InvalidDecimal(s.to_string()))
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
