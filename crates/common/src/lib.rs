//! Shared types for the order processing engine.

mod ids;
mod model;
mod money;
mod status;

pub use ids::{CustomerId, EstablishmentId, OrderId, ProductId};
pub use model::{
    Coupon, CouponRedemption, CouponUsage, DiscountType, Establishment, EstablishmentFields,
    LoyaltyAccount, LoyaltyReason, LoyaltyTransaction, NewOrderEvent, Order, OrderEvent,
    OrderItem, Product,
};
pub use money::Money;
pub use status::{OrderStatus, ParseStatusError};
