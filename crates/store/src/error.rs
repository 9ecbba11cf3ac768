use common::{CustomerId, OrderId, OrderStatus};
use thiserror::Error;

/// Errors that can occur when reading from or writing to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order id is already taken (a draft committed twice).
    #[error("Order already exists: {0}")]
    OrderExists(OrderId),

    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Another unit of work changed the order's status first.
    #[error("Order {order_id} is {actual}, expected {expected}")]
    StatusMismatch {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// The coupon referenced by a redemption does not exist.
    #[error("Coupon not found: {0}")]
    CouponNotFound(String),

    /// The customer already redeemed this coupon.
    #[error("Coupon {code} already used by customer {customer_id}")]
    CouponAlreadyUsed {
        code: String,
        customer_id: CustomerId,
    },

    /// The coupon reached its redemption cap.
    #[error("Coupon {code} exhausted after {max_uses} uses")]
    CouponExhausted { code: String, max_uses: i64 },

    /// A debit would take the points balance below zero.
    #[error("Customer {customer_id} has {balance} points, needs {requested}")]
    InsufficientPoints {
        customer_id: CustomerId,
        balance: i64,
        requested: i64,
    },

    /// The unit of work is malformed.
    #[error("Invalid unit of work: {0}")]
    InvalidUnit(String),

    /// A record failed its own invariants or could not be decoded.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The backend is temporarily unable to serve the request.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for failures worth retrying unchanged after a backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }

    /// Returns true if the database aborted the transaction because it lost
    /// a race (serialization failure or deadlock).
    pub fn is_serialization_failure(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
