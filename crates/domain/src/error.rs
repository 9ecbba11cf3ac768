//! Order engine error types.

use common::{OrderId, OrderStatus, ProductId};
use store::StoreError;
use thiserror::Error;

/// Errors returned by the order engine.
///
/// Validation errors are final: the caller has to change the request.
/// `Unavailable` may be retried as-is after a backoff, `Conflict` only after
/// re-reading the order.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request has no items.
    #[error("Order has no items")]
    EmptyOrder,

    /// The product does not exist, is inactive, or belongs to another
    /// establishment.
    #[error("Product unavailable: {product_id}")]
    ProductUnavailable { product_id: ProductId },

    #[error("Invalid quantity {quantity} for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    /// The order's subtotal does not fit in the money representation.
    #[error("Order total too large")]
    OrderTooLarge,

    /// The coupon code is unknown.
    #[error("Coupon invalid: {code}")]
    CouponInvalid { code: String },

    /// Today is outside the coupon's validity window.
    #[error("Coupon expired: {code}")]
    CouponExpired { code: String },

    #[error("Coupon already used: {code}")]
    CouponAlreadyUsed { code: String },

    #[error("Coupon exhausted: {code}")]
    CouponExhausted { code: String },

    #[error("Insufficient loyalty points: balance {balance}, requested {requested}")]
    InsufficientPoints { balance: i64, requested: i64 },

    /// The status change is not allowed from the order's current status.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// Storage failed transiently or did not answer in time.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A concurrent operation changed the same data first.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The stored audit trail does not describe a legal lifecycle.
    #[error("Invalid order history: {0}")]
    InvalidHistory(String),

    /// An event payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other storage failure.
    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl OrderError {
    /// Returns true if the caller may retry, possibly after re-reading state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::Unavailable(_) | OrderError::Conflict(_))
    }

    /// Short machine-readable name, used as a metrics label and in API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::EmptyOrder => "EMPTY_ORDER",
            OrderError::ProductUnavailable { .. } => "PRODUCT_UNAVAILABLE",
            OrderError::InvalidQuantity { .. } => "INVALID_QUANTITY",
            OrderError::OrderTooLarge => "ORDER_TOO_LARGE",
            OrderError::CouponInvalid { .. } => "COUPON_INVALID",
            OrderError::CouponExpired { .. } => "COUPON_EXPIRED",
            OrderError::CouponAlreadyUsed { .. } => "COUPON_ALREADY_USED",
            OrderError::CouponExhausted { .. } => "COUPON_EXHAUSTED",
            OrderError::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            OrderError::InvalidTransition { .. } => "INVALID_TRANSITION",
            OrderError::NotFound(_) => "NOT_FOUND",
            OrderError::Unavailable(_) => "UNAVAILABLE",
            OrderError::Conflict(_) => "CONFLICT",
            OrderError::InvalidHistory(_) => "INVALID_HISTORY",
            OrderError::Serialization(_) => "SERIALIZATION",
            OrderError::Storage(_) => "STORAGE",
        }
    }
}

impl From<StoreError> for OrderError {
    fn from(e: StoreError) -> Self {
        if e.is_serialization_failure() {
            return OrderError::Conflict(e.to_string());
        }
        if e.is_transient() {
            return OrderError::Unavailable(e.to_string());
        }

        match e {
            StoreError::OrderExists(id) => {
                OrderError::Conflict(format!("order {id} is already committed"))
            }
            StoreError::OrderNotFound(id) => OrderError::NotFound(id),
            StoreError::StatusMismatch { .. } => OrderError::Conflict(e.to_string()),
            StoreError::CouponNotFound(code) => OrderError::CouponInvalid { code },
            StoreError::CouponAlreadyUsed { code, .. } => OrderError::CouponAlreadyUsed { code },
            StoreError::CouponExhausted { code, .. } => OrderError::CouponExhausted { code },
            StoreError::InsufficientPoints {
                balance, requested, ..
            } => OrderError::InsufficientPoints { balance, requested },
            other => OrderError::Storage(other),
        }
    }
}

/// Result type for order engine operations.
pub type Result<T> = std::result::Result<T, OrderError>;
