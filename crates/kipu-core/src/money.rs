//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A balance that drifts by a céntimo per payment is exactly the class   │
//! │  of bug the reconciliation routine exists to repair. We don't create   │
//! │  the bug in the first place.                                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Céntimos                                        │
//! │    S/ 100.00 = 10000 céntimos (i64)                                    │
//! │    All ledger math is integer math; zero means exactly zero            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kipu_core::money::Money;
//!
//! // Create from céntimos (preferred)
//! let total = Money::from_cents(10_000); // S/ 100.00
//!
//! let paid = Money::from_cents(6_000);
//! let balance = total - paid;
//! assert_eq!(balance.cents(), 4_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (céntimos for PEN).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for credit notes and reversals
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
///
/// Every amount in the system — document totals, detractions, payments,
/// outstanding balances — flows through this type. The only place a decimal
/// representation appears is at the gateway wire boundary
/// ([`Money::as_decimal`]) and in `Display`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from céntimos (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use kipu_core::money::Money;
    ///
    /// let igv = Money::from_cents(1_800); // S/ 18.00
    /// assert_eq!(igv.cents(), 1_800);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units (soles and céntimos).
    ///
    /// ## Note
    /// For negative amounts, only the major unit should be negative.
    /// `from_major_minor(-5, 50)` = -S/ 5.50, not -S/ 4.50
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in céntimos.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (soles) portion.
    #[inline]
    pub const fn units(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit (céntimos) portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
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

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Subtracts `other`, flooring the result at zero.
    ///
    /// Net payable is `total - detraction`, and a corrupted detraction must
    /// never produce a negative collectible amount.
    ///
    /// ## Example
    /// ```rust
    /// use kipu_core::money::Money;
    ///
    /// let total = Money::from_cents(10_000);
    /// let detraction = Money::from_cents(12_000);
    /// assert_eq!(total.saturating_sub_floor(detraction), Money::zero());
    /// ```
    #[inline]
    pub const fn saturating_sub_floor(&self, other: Money) -> Money {
        let result = self.0 - other.0;
        if result < 0 {
            Money(0)
        } else {
            Money(result)
        }
    }

    /// Calculates IGV (Peruvian VAT) using half-up rounding.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`.
    /// `rate_bps` is basis points: 1800 = 18.00% (the standard IGV rate).
    ///
    /// ## Example
    /// ```rust
    /// use kipu_core::money::Money;
    ///
    /// let taxable = Money::from_cents(10_000); // S/ 100.00
    /// let igv = taxable.calculate_tax(1800);   // 18%
    /// assert_eq!(igv.cents(), 1_800);          // S/ 18.00
    /// ```
    pub fn calculate_tax(&self, rate_bps: u32) -> Money {
        // i128 prevents overflow on large amounts
        let tax_cents = (self.0 as i128 * rate_bps as i128 + 5000) / 10000;
        Money::from_cents(tax_cents as i64)
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use kipu_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(2_500);
    /// assert_eq!(unit_price.multiply_quantity(4).cents(), 10_000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns the value as a decimal number of currency units.
    ///
    /// ## WIRE BOUNDARY ONLY
    /// The gateway speaks JSON numbers with two decimals; this is the single
    /// sanctioned escape hatch out of integer land. Never feed the result
    /// back into ledger arithmetic.
    #[inline]
    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// For debugging and log lines. Receipt/UI formatting is out of scope here.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}S/ {}.{:02}", sign, self.units().abs(), self.cents_part())
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

/// Addition of two Money values.
impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

/// Addition assignment (+=).
impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

/// Subtraction of two Money values.
impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

/// Subtraction assignment (-=).
impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by i64 (for quantity calculations).
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
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
        assert_eq!(money.units(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        let money = Money::from_major_minor(10, 99);
        assert_eq!(money.cents(), 1099);

        let negative = Money::from_major_minor(-5, 50);
        assert_eq!(negative.cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "S/ 10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "S/ 5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-S/ 5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "S/ 0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
    }

    #[test]
    fn test_saturating_sub_floor() {
        let total = Money::from_cents(10_000);
        assert_eq!(
            total.saturating_sub_floor(Money::from_cents(1_200)).cents(),
            8_800
        );
        // Detraction larger than total floors at zero
        assert_eq!(
            total.saturating_sub_floor(Money::from_cents(12_000)),
            Money::zero()
        );
    }

    #[test]
    fn test_igv_calculation() {
        // S/ 100.00 at 18% = S/ 18.00
        let taxable = Money::from_cents(10_000);
        assert_eq!(taxable.calculate_tax(1800).cents(), 1_800);

        // Rounds half up: S/ 0.25 at 18% = 4.5 céntimos → 5
        let small = Money::from_cents(25);
        assert_eq!(small.calculate_tax(1800).cents(), 5);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        let positive = Money::from_cents(100);
        assert!(positive.is_positive());

        let negative = Money::from_cents(-100);
        assert!(negative.is_negative());
    }

    #[test]
    fn test_as_decimal() {
        assert_eq!(Money::from_cents(10_000).as_decimal(), 100.0);
        assert_eq!(Money::from_cents(1_099).as_decimal(), 10.99);
    }
}
