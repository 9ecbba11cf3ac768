//! Order pricing.

use common::{Coupon, DiscountType, Money, OrderItem};
use serde::{Deserialize, Serialize};

/// Totals of a priced order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub coupon_discount: Money,
    pub loyalty_discount: Money,
    pub total: Money,
}

impl PriceBreakdown {
    /// Prices `items` with an optional coupon and a loyalty discount.
    ///
    /// The coupon applies to the subtotal first. `points_value` is what the
    /// redeemed points are worth and is capped at what remains, so the total
    /// never goes below zero. Returns `None` when the subtotal overflows.
    pub fn compute(
        items: &[OrderItem],
        coupon: Option<&Coupon>,
        points_value: Money,
    ) -> Option<Self> {
        let subtotal = items
            .iter()
            .try_fold(Money::zero(), |acc, item| acc.checked_add(item.total_price))?;

        let coupon_discount = coupon
            .map(|c| coupon_discount(c, subtotal))
            .unwrap_or_default();
        let after_coupon = subtotal.saturating_sub(coupon_discount);

        let loyalty_discount = points_value.max(Money::zero()).min(after_coupon);
        let total = after_coupon.saturating_sub(loyalty_discount);

        Some(Self {
            subtotal,
            coupon_discount,
            loyalty_discount,
            total,
        })
    }
}

fn coupon_discount(coupon: &Coupon, subtotal: Money) -> Money {
    match coupon.discount_type {
        DiscountType::Percentage => subtotal.percent(coupon.discount_value),
        DiscountType::Fixed => Money::from_cents(coupon.discount_value).min(subtotal),
    }
}
