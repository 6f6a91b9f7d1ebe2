//! Pricing calculator.
//!
//! Pure arithmetic over a set of cart lines: no I/O, no state. All amounts
//! are decimal ([`Money`]); rounding happens only when a total is displayed.

use rust_decimal::Decimal;

use quince_core::Money;

use crate::models::CartLine;

/// Shipping is waived when the subtotal is strictly greater than this.
fn free_shipping_threshold() -> Money {
    Money::from_cents(50_00)
}

/// Flat shipping fee below the threshold.
fn flat_shipping_fee() -> Money {
    Money::from_cents(5_99)
}

/// Flat 8% tax rate; no jurisdiction logic.
fn tax_rate() -> Decimal {
    Decimal::new(8, 2)
}

/// Priced breakdown of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartTotals {
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

impl CartTotals {
    /// The same breakdown with every amount rounded to two decimal places.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            subtotal: Money::new(self.subtotal.rounded()),
            shipping: Money::new(self.shipping.rounded()),
            tax: Money::new(self.tax.rounded()),
            total: Money::new(self.total.rounded()),
        }
    }
}

/// Price a set of cart lines.
///
/// - `subtotal` - sum of `quantity x unit price`; a line whose product
///   reference failed to resolve contributes zero
/// - `shipping` - zero iff `subtotal > 50.00` (strict), else 5.99
/// - `tax` - 8% of the subtotal
/// - `total` - sum of the above
#[must_use]
pub fn price(lines: &[CartLine]) -> CartTotals {
    let subtotal: Money = lines
        .iter()
        .map(|line| {
            line.product
                .as_ref()
                .map_or(Money::ZERO, |p| p.price.times(line.quantity))
        })
        .sum();

    let shipping = if subtotal > free_shipping_threshold() {
        Money::ZERO
    } else {
        flat_shipping_fee()
    };
    let tax = subtotal.at_rate(tax_rate());
    let total = subtotal + shipping + tax;

    CartTotals {
        subtotal,
        shipping,
        tax,
        total,
    }
}

/// How much more must be spent to reach free shipping, if anything.
///
/// `None` for an empty cart (the banner would be noise) and from the
/// threshold upward.
#[must_use]
pub fn amount_to_free_shipping(subtotal: Money) -> Option<Money> {
    if subtotal.is_zero() || subtotal >= free_shipping_threshold() {
        None
    } else {
        Some(free_shipping_threshold() - subtotal)
    }
}
