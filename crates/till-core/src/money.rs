//! # Money Module
//!
//! Provides the `Money` type for settled monetary values.
//!
//! ## Decimal In, Cents Out
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  WHERE ROUNDING HAPPENS                                                 │
//! │                                                                         │
//! │  Catalog price (Decimal, e.g. 19.995)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Discount math in Decimal (exact: 19.995 × 0.9 = 17.9955)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Money::from_decimal ← ONE half-up rounding to minor units (18.00)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Money (i64 cents) - never re-rounded, never fed back into the math    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use rust_decimal::Decimal;
//! use till_core::money::Money;
//!
//! let price = Money::from_cents(1099); // 10.99
//! let settled = Money::from_decimal(Decimal::new(179955, 4)); // 17.9955
//! assert_eq!(settled.cents(), 1800);
//! assert_eq!((price + settled).cents(), 2899);
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: differences (e.g. discount amounts) stay representable
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Only produced by rounding once**: see [`Money::from_decimal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Rounds a decimal amount half-up (away from zero at the midpoint) to two
    /// decimal places and converts it to cents.
    ///
    /// ## Example
    /// ```rust
    /// use rust_decimal::Decimal;
    /// use till_core::money::Money;
    ///
    /// assert_eq!(Money::from_decimal(Decimal::new(1005, 3)).cents(), 101); // 1.005
    /// assert_eq!(Money::from_decimal(Decimal::new(1004, 3)).cents(), 100); // 1.004
    /// ```
    pub fn from_decimal(amount: Decimal) -> Self {
        let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);
        let cents = rounded.mantissa();
        let cents = i64::try_from(cents).unwrap_or(if cents < 0 { i64::MIN } else { i64::MAX });
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the value as an exact decimal with two fractional digits.
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Clamps negative values to zero.
    #[inline]
    pub const fn clamp_non_negative(self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            self
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain `major.minor` rendering; currency symbols are a presentation concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_half_up_rounding() {
        // 17.9955 → 18.00
        assert_eq!(Money::from_decimal(Decimal::new(179955, 4)).cents(), 1800);
        // 2.345 → 2.35 (banker's rounding would give 2.34)
        assert_eq!(Money::from_decimal(Decimal::new(2345, 3)).cents(), 235);
        // 2.344 → 2.34
        assert_eq!(Money::from_decimal(Decimal::new(2344, 3)).cents(), 234);
    }

    #[test]
    fn test_whole_and_short_scales() {
        assert_eq!(Money::from_decimal(Decimal::new(5, 0)).cents(), 500);
        assert_eq!(Money::from_decimal(Decimal::new(55, 1)).cents(), 550);
    }

    #[test]
    fn test_to_decimal_is_exact() {
        assert_eq!(Money::from_cents(1800).to_decimal(), Decimal::new(18, 0));
    }

    #[test]
    fn test_clamp_non_negative() {
        assert_eq!(Money::from_cents(-1).clamp_non_negative(), Money::zero());
        assert_eq!(Money::from_cents(42).clamp_non_negative().cents(), 42);
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);
        assert_eq!((a + b).cents(), 1250);
        assert_eq!((a - b).cents(), 750);

        let mut c = a;
        c -= b;
        c += Money::from_cents(1);
        assert_eq!(c.cents(), 751);
        assert!(!c.is_zero());
        assert!((b - a).is_negative());
    }
}
