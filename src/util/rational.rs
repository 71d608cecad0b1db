//! Exact rational arithmetic for objective coefficients and values.
//!
//! Objective coefficients are rationals (energy costs, normalized resource
//! fractions). They are kept exact until the last possible moment: dominance
//! comparisons cross-multiply in `i128` and reduction to integer weights is
//! checked, so overflow is reported instead of silently wrapping. `f64` is
//! only ever produced for display.

use crate::error::{CoreError, Result};
use std::cmp::Ordering;
use std::fmt;

/// A normalized fraction `num / den` with `den > 0` and `gcd(num, den) == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i64,
    den: i64,
}

/// Greatest common divisor on magnitudes.
pub fn gcd(a: u64, b: u64) -> u64 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple, or `None` on overflow.
pub fn lcm(a: i64, b: i64) -> Option<i64> {
    debug_assert!(a > 0 && b > 0);
    let g = gcd(a as u64, b as u64) as i64;
    (a / g).checked_mul(b)
}

impl Rational {
    /// The zero value.
    pub const ZERO: Rational = Rational { num: 0, den: 1 };

    /// Build a normalized rational. `den` must be non-zero.
    pub fn new(num: i64, den: i64) -> Rational {
        assert!(den != 0, "rational with zero denominator");
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let g = gcd(num.unsigned_abs(), den as u64) as i64;
        if g > 1 {
            Rational { num: num / g, den: den / g }
        } else {
            Rational { num, den }
        }
    }

    /// A whole number.
    pub fn from_integer(n: i64) -> Rational {
        Rational { num: n, den: 1 }
    }

    /// Parse a non-negative decimal literal such as `1`, `0.5` or `12.25`.
    pub fn from_decimal_str(s: &str) -> std::result::Result<Rational, String> {
        let s = s.trim();
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(format!("empty decimal literal {s:?}"));
        }
        let int: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| format!("bad decimal literal {s:?}"))?
        };
        if frac_part.is_empty() {
            return Ok(Rational::from_integer(int));
        }
        if frac_part.len() > 15 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("bad decimal literal {s:?}"));
        }
        let frac: i64 = frac_part.parse().map_err(|_| format!("bad decimal literal {s:?}"))?;
        let scale = 10i64.pow(frac_part.len() as u32);
        let num = int
            .checked_mul(scale)
            .and_then(|n| n.checked_add(frac))
            .ok_or_else(|| format!("decimal literal {s:?} out of range"))?;
        Ok(Rational::new(num, scale))
    }

    /// Numerator of the normalized fraction.
    pub fn numerator(&self) -> i64 {
        self.num
    }

    /// Denominator of the normalized fraction (always positive).
    pub fn denominator(&self) -> i64 {
        self.den
    }

    /// Whether this is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Checked addition.
    pub fn checked_add(&self, other: &Rational) -> Result<Rational> {
        let den = lcm(self.den, other.den).ok_or(CoreError::EncodingOverflow)?;
        let a = self
            .num
            .checked_mul(den / self.den)
            .ok_or(CoreError::EncodingOverflow)?;
        let b = other
            .num
            .checked_mul(den / other.den)
            .ok_or(CoreError::EncodingOverflow)?;
        let num = a.checked_add(b).ok_or(CoreError::EncodingOverflow)?;
        Ok(Rational::new(num, den))
    }

    /// Checked subtraction.
    pub fn checked_sub(&self, other: &Rational) -> Result<Rational> {
        self.checked_add(&Rational { num: -other.num, den: other.den })
    }

    /// Checked multiplication.
    pub fn checked_mul(&self, other: &Rational) -> Result<Rational> {
        // Cross-reduce first so intermediate products stay small.
        let g1 = gcd(self.num.unsigned_abs(), other.den as u64) as i64;
        let g2 = gcd(other.num.unsigned_abs(), self.den as u64) as i64;
        let num = (self.num / g1)
            .checked_mul(other.num / g2)
            .ok_or(CoreError::EncodingOverflow)?;
        let den = (self.den / g2)
            .checked_mul(other.den / g1)
            .ok_or(CoreError::EncodingOverflow)?;
        Ok(Rational::new(num, den))
    }

    /// Absolute value.
    pub fn abs(&self) -> Rational {
        Rational { num: self.num.abs(), den: self.den }
    }

    /// Lossy conversion for display only.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}
