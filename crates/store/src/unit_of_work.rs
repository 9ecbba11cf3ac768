//! The atomic write boundary of the order engine.

use common::{
    Coupon, CouponRedemption, CouponUsage, CustomerId, LoyaltyTransaction, NewOrderEvent, Order,
    OrderEvent, OrderId, OrderItem, OrderStatus,
};

use crate::StoreError;

/// One write inside a [`UnitOfWork`].
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Persists a new order with its lines.
    InsertOrder { order: Order, items: Vec<OrderItem> },

    /// Replaces an order row if its status is still `expected_status`.
    UpdateOrder {
        order: Order,
        expected_status: OrderStatus,
    },

    /// Records a coupon use. The store re-checks uniqueness and the coupon's
    /// `max_uses` against the current redemption count.
    RedeemCoupon(CouponRedemption),

    /// Posts a points delta and moves the balance by the same amount. The
    /// store rejects a delta that would make the balance negative.
    PostLoyalty(LoyaltyTransaction),

    /// Appends an audit event.
    AppendEvent(NewOrderEvent),
}

impl Mutation {
    fn order_id(&self) -> Option<OrderId> {
        match self {
            Mutation::InsertOrder { order, .. } | Mutation::UpdateOrder { order, .. } => {
                Some(order.id)
            }
            Mutation::RedeemCoupon(r) => Some(r.order_id),
            Mutation::PostLoyalty(t) => t.order_id,
            Mutation::AppendEvent(e) => Some(e.order_id),
        }
    }

    fn is_order_write(&self) -> bool {
        matches!(
            self,
            Mutation::InsertOrder { .. } | Mutation::UpdateOrder { .. }
        )
    }
}

/// All writes of one order commit or transition.
///
/// Stores apply a unit in two phases: every mutation is validated (in unit
/// order, under the relevant locks) before any is written, and the writes
/// either all become visible or none do.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    order_id: OrderId,
    mutations: Vec<Mutation>,
}

impl UnitOfWork {
    /// Starts an empty unit scoped to `order_id`.
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            mutations: Vec::new(),
        }
    }

    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    pub fn with(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }

    /// The order row this unit writes.
    pub fn order(&self) -> Option<&Order> {
        self.mutations.iter().find_map(|m| match m {
            Mutation::InsertOrder { order, .. } | Mutation::UpdateOrder { order, .. } => {
                Some(order)
            }
            _ => None,
        })
    }

    /// Audit events carried by this unit, in append order.
    pub fn events(&self) -> impl Iterator<Item = &NewOrderEvent> {
        self.mutations.iter().filter_map(|m| match m {
            Mutation::AppendEvent(e) => Some(e),
            _ => None,
        })
    }

    /// Checks the structural rules every store enforces before touching data.
    ///
    /// A unit must write the order row exactly once, must carry at least one
    /// audit event, and may only touch the order it is scoped to.
    pub fn validate(&self) -> Result<(), String> {
        if self.mutations.is_empty() {
            return Err("Cannot apply an empty unit of work".to_string());
        }

        let order_writes = self.mutations.iter().filter(|m| m.is_order_write()).count();
        if order_writes != 1 {
            return Err(format!(
                "A unit of work must write the order exactly once, found {order_writes}"
            ));
        }

        if self.events().next().is_none() {
            return Err("A unit of work must append at least one order event".to_string());
        }

        if let Some(m) = self
            .mutations
            .iter()
            .find(|m| m.order_id().is_some_and(|id| id != self.order_id))
        {
            return Err(format!(
                "Mutation {m:?} does not belong to order {}",
                self.order_id
            ));
        }

        Ok(())
    }
}

/// Decides whether one more use of `coupon` by `customer_id` is allowed.
///
/// A repeat on the same order is always `CouponAlreadyUsed`. Once the cap is
/// reached, a customer who holds one of the counted redemptions is told the
/// coupon is already used; everybody else is told it is exhausted.
pub fn check_coupon_use(
    coupon: &Coupon,
    usage: CouponUsage,
    customer_id: CustomerId,
) -> Result<(), StoreError> {
    if usage.on_order {
        return Err(StoreError::CouponAlreadyUsed {
            code: coupon.code.clone(),
            customer_id,
        });
    }

    if let Some(max_uses) = coupon.max_uses
        && usage.total >= max_uses
    {
        if usage.by_customer > 0 {
            return Err(StoreError::CouponAlreadyUsed {
                code: coupon.code.clone(),
                customer_id,
            });
        }
        return Err(StoreError::CouponExhausted {
            code: coupon.code.clone(),
            max_uses,
        });
    }

    Ok(())
}

/// Checks that moving `balance` by `delta` keeps it non-negative.
pub fn check_points(customer_id: CustomerId, balance: i64, delta: i64) -> Result<i64, StoreError> {
    let next = balance + delta;
    if next < 0 {
        return Err(StoreError::InsufficientPoints {
            customer_id,
            balance,
            requested: -delta,
        });
    }
    Ok(next)
}

/// What a successfully applied unit of work produced.
#[derive(Debug, Clone)]
pub struct Applied {
    /// The order row as written.
    pub order: Order,

    /// The appended events with their assigned sequence numbers.
    pub events: Vec<OrderEvent>,
}
