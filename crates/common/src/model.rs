//! Persisted records of the ordering platform.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CustomerId, EstablishmentId, Money, OrderId, OrderStatus, ProductId};

/// A committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub establishment_id: EstablishmentId,
    pub coupon_code: Option<String>,
    pub loyalty_points_applied: i64,

    /// Sum of line totals before any discount.
    pub subtotal: Money,
    pub coupon_discount: Money,
    pub loyalty_discount: Money,

    /// `subtotal - coupon_discount - loyalty_discount`, floored at zero.
    pub total: Money,

    pub status: OrderStatus,
    pub ordered_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A line of an order, priced at the time the order was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,

    /// Position of the line in the original request.
    pub position: i32,
    pub quantity: i32,
    pub unit_price: Money,
    pub total_price: Money,
}

impl OrderItem {
    /// Creates a line, snapshotting `unit_price` and deriving the line total.
    ///
    /// Returns `None` when the line total does not fit in an `i64` of cents.
    pub fn new(
        order_id: OrderId,
        product: &Product,
        position: i32,
        quantity: i32,
    ) -> Option<Self> {
        Some(Self {
            order_id,
            product_id: product.id,
            product_name: product.name.clone(),
            position,
            quantity,
            unit_price: product.price,
            total_price: product.price.checked_multiply(quantity)?,
        })
    }
}

/// An entry of an order's audit trail, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Store-assigned, strictly increasing across all events.
    pub sequence: i64,
    pub id: Uuid,
    pub order_id: OrderId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An audit entry waiting to be appended; the store assigns its sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderEvent {
    pub id: Uuid,
    pub order_id: OrderId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NewOrderEvent {
    pub fn new(
        order_id: OrderId,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            event_type: event_type.into(),
            payload,
            created_at,
        }
    }

    /// Attaches the sequence number assigned on insert.
    pub fn into_stored(self, sequence: i64) -> OrderEvent {
        OrderEvent {
            sequence,
            id: self.id,
            order_id: self.order_id,
            event_type: self.event_type,
            payload: self.payload,
            created_at: self.created_at,
        }
    }
}

/// How a coupon's `discount_value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// `discount_value` is a percentage of the subtotal.
    Percentage,

    /// `discount_value` is an amount in cents.
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "PERCENTAGE",
            DiscountType::Fixed => "FIXED",
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERCENTAGE" => Ok(DiscountType::Percentage),
            "FIXED" => Ok(DiscountType::Fixed),
            other => Err(format!("unknown discount type: {other}")),
        }
    }
}

/// A discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,

    /// Redemption cap across all customers; `None` is unlimited.
    pub max_uses: Option<i64>,
}

impl Coupon {
    /// Returns true if `date` falls inside the inclusive validity window.
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && date <= self.valid_until
    }

    /// Checks the record-level invariants.
    pub fn check(&self) -> Result<(), String> {
        if self.code.trim().is_empty() {
            return Err("coupon code must not be empty".to_string());
        }
        if self.valid_from > self.valid_until {
            return Err(format!(
                "coupon {}: valid_from {} is after valid_until {}",
                self.code, self.valid_from, self.valid_until
            ));
        }
        if self.discount_value < 0 {
            return Err(format!("coupon {}: negative discount value", self.code));
        }
        if self.discount_type == DiscountType::Percentage && self.discount_value > 100 {
            return Err(format!("coupon {}: percentage above 100", self.code));
        }
        if matches!(self.max_uses, Some(n) if n < 0) {
            return Err(format!("coupon {}: negative max_uses", self.code));
        }
        Ok(())
    }
}

/// One use of a coupon by a customer on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRedemption {
    pub id: Uuid,
    pub coupon_code: String,
    pub customer_id: CustomerId,
    pub order_id: OrderId,
    pub redeemed_at: DateTime<Utc>,
}

/// Redemption counts relevant to one prospective use of a coupon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CouponUsage {
    /// Redemptions across all customers.
    pub total: i64,

    /// Redemptions by the customer in question.
    pub by_customer: i64,

    /// Whether this customer already redeemed the coupon on this order.
    pub on_order: bool,
}

/// A customer's points balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyAccount {
    pub customer_id: CustomerId,
    pub points_balance: i64,
    pub tier: String,
    pub updated_at: DateTime<Utc>,
}

/// Why a loyalty transaction was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoyaltyReason {
    /// Points spent as a discount on an order.
    Redemption,

    /// Points earned by completing an order.
    Accrual,

    /// Redeemed points returned after a cancelled or failed order.
    Refund,

    /// Balance granted when the account was opened.
    OpeningBalance,
}

impl LoyaltyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoyaltyReason::Redemption => "REDEMPTION",
            LoyaltyReason::Accrual => "ACCRUAL",
            LoyaltyReason::Refund => "REFUND",
            LoyaltyReason::OpeningBalance => "OPENING_BALANCE",
        }
    }
}

impl std::str::FromStr for LoyaltyReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REDEMPTION" => Ok(LoyaltyReason::Redemption),
            "ACCRUAL" => Ok(LoyaltyReason::Accrual),
            "REFUND" => Ok(LoyaltyReason::Refund),
            "OPENING_BALANCE" => Ok(LoyaltyReason::OpeningBalance),
            other => Err(format!("unknown loyalty reason: {other}")),
        }
    }
}

/// Append-only points ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyTransaction {
    pub id: Uuid,
    pub customer_id: CustomerId,
    pub order_id: Option<OrderId>,
    pub delta: i64,
    pub reason: LoyaltyReason,
    pub created_at: DateTime<Utc>,
}

impl LoyaltyTransaction {
    pub fn new(
        customer_id: CustomerId,
        order_id: Option<OrderId>,
        delta: i64,
        reason: LoyaltyReason,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            order_id,
            delta,
            reason,
            created_at,
        }
    }
}

/// A merchant/restaurant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Establishment {
    pub id: EstablishmentId,
    pub name: String,
    pub description: String,
    pub address: String,
    pub image_key: String,
    pub banner_key: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable fields of an establishment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishmentFields {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub image_key: String,
    #[serde(default)]
    pub banner_key: String,
    #[serde(default)]
    pub phone: String,
}

/// A catalog entry as seen by the order builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub establishment_id: EstablishmentId,
    pub name: String,

    /// Current price; orders snapshot it into their lines.
    pub price: Money,
    pub active: bool,
}
