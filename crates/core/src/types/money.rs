//! Monetary amounts backed by decimal arithmetic.
//!
//! All prices and totals in the storefront use [`Money`]. Amounts accumulate
//! exactly (no binary floating point); rounding to two decimal places happens
//! only at presentation via [`Money::display`] or [`Money::rounded`].

use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A USD amount.
///
/// Internally a [`rust_decimal::Decimal`] in the currency's standard unit
/// (dollars, not cents).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero dollars.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Construct from an integer number of cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// The exact (unrounded) decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// The amount rounded to two decimal places for presentation.
    #[must_use]
    pub fn rounded(&self) -> Decimal {
        self.0.round_dp(2)
    }

    /// Format for display (e.g. `$19.99`).
    #[must_use]
    pub fn display(&self) -> String {
        format!("${:.2}", self.rounded())
    }

    /// Multiply by a quantity.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Multiply by a decimal rate (used for tax).
    #[must_use]
    pub fn at_rate(&self, rate: Decimal) -> Self {
        Self(self.0 * rate)
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn from_cents_scales_correctly() {
        assert_eq!(Money::from_cents(599).display(), "$5.99");
        assert_eq!(Money::from_cents(5000).display(), "$50.00");
    }

    #[test]
    fn accumulation_is_exact() {
        // 0.1 + 0.2 drifts under f64; must not here.
        let sum = Money::from_cents(10) + Money::from_cents(20);
        assert_eq!(sum, Money::from_cents(30));
    }

    #[test]
    fn times_multiplies_by_quantity() {
        assert_eq!(Money::from_cents(2000).times(3), Money::from_cents(6000));
    }

    #[test]
    fn at_rate_computes_tax_exactly() {
        let tax = Money::from_cents(6000).at_rate(Decimal::new(8, 2));
        assert_eq!(tax, Money::from_cents(480));
    }

    #[test]
    fn rounding_only_at_presentation() {
        let m = Money::new(Decimal::new(12346, 3)); // 12.346
        assert_eq!(m.amount(), Decimal::new(12346, 3));
        assert_eq!(m.display(), "$12.35");
    }

    #[test]
    fn sum_over_iterator() {
        let total: Money = [Money::from_cents(100), Money::from_cents(250)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_cents(350));
    }
}
