//! Money value object.
//!
//! Amounts are held as integer cents so totals are exact: adding then
//! removing the same expense always returns a budget to the same total.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A monetary amount in cents (hundredths of the currency unit).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Largest amount a single budget or expense may carry: $1,000,000,000.00.
    pub const MAX_AMOUNT: Money = Money(100_000_000_000);

    /// Creates an amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a zero amount.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Creates an amount from a major-unit decimal (e.g. `4.50`), rounding
    /// to the nearest cent.
    ///
    /// Returns `None` for NaN, infinities, or values outside the `i64` cent range.
    pub fn from_major(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = (value * 100.0).round();
        // `i64::MAX as f64` rounds up to 2^63, which does not fit.
        if cents < i64::MIN as f64 || cents >= i64::MAX as f64 {
            return None;
        }
        Some(Self(cents as i64))
    }

    /// Returns the amount in cents.
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the amount as a major-unit decimal.
    pub fn as_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}${}.{:02}", sign, group_thousands(abs / 100), abs % 100)
    }
}

fn group_thousands(whole: u64) -> String {
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// Arithmetic saturates so a corrupt row cannot panic a total.

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
