//! Plans the atomic unit of work behind each commit and transition.
//!
//! The planner decides which ledger mutations and audit events belong
//! together; the store applies them all or none.

use chrono::{DateTime, Utc};
use common::{CouponRedemption, LoyaltyReason, LoyaltyTransaction, Order, OrderStatus};
use store::{Mutation, UnitOfWork};
use uuid::Uuid;

use crate::audit::{AuditEvent, CouponRedeemed, StatusChange};
use crate::builder::OrderDraft;
use crate::config::EngineConfig;
use crate::error::Result;

/// Builds the unit that commits `draft` at `now`.
///
/// Ledger checks come first so the store reports a spent coupon or an
/// overdrawn balance before a duplicate order id.
pub fn plan_commit(draft: &OrderDraft, now: DateTime<Utc>) -> Result<UnitOfWork> {
    let mut order = draft.order.clone();
    order.ordered_at = now;
    order.updated_at = now;

    let mut unit = UnitOfWork::new(order.id);
    let mut events = vec![AuditEvent::StatusChanged(StatusChange {
        status: OrderStatus::Pending,
        prior_status: None,
        reason: None,
        actor: None,
    })];

    if let Some(code) = &order.coupon_code {
        unit.push(Mutation::RedeemCoupon(CouponRedemption {
            id: Uuid::new_v4(),
            coupon_code: code.clone(),
            customer_id: order.customer_id,
            order_id: order.id,
            redeemed_at: now,
        }));
        events.push(AuditEvent::CouponRedeemed(CouponRedeemed {
            coupon_code: code.clone(),
            customer_id: order.customer_id,
            discount: order.coupon_discount,
        }));
    }

    if order.loyalty_points_applied > 0 {
        let delta = -order.loyalty_points_applied;
        unit.push(Mutation::PostLoyalty(LoyaltyTransaction::new(
            order.customer_id,
            Some(order.id),
            delta,
            LoyaltyReason::Redemption,
            now,
        )));
        events.push(AuditEvent::points(
            order.customer_id,
            delta,
            LoyaltyReason::Redemption,
        ));
    }

    let order_id = order.id;
    unit.push(Mutation::InsertOrder {
        order,
        items: draft.items.clone(),
    });
    for event in events {
        unit.push(Mutation::AppendEvent(event.record(order_id, now)?));
    }

    Ok(unit)
}

/// Builds the unit that moves `current` to `next`.
///
/// Completion credits accrued points; cancellation or failure refunds the
/// points the order redeemed. Zero-point postings are skipped.
pub fn plan_transition(
    current: &Order,
    next: Order,
    change: StatusChange,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<UnitOfWork> {
    let mut unit = UnitOfWork::new(next.id);
    let mut events = vec![AuditEvent::StatusChanged(change)];

    let posting = match next.status {
        OrderStatus::Completed => Some((config.accrual_for(next.total), LoyaltyReason::Accrual)),
        OrderStatus::Cancelled | OrderStatus::Failed => {
            Some((current.loyalty_points_applied, LoyaltyReason::Refund))
        }
        _ => None,
    };

    let mut postings = Vec::new();
    if let Some((points, reason)) = posting
        && points > 0
    {
        postings.push(Mutation::PostLoyalty(LoyaltyTransaction::new(
            next.customer_id,
            Some(next.id),
            points,
            reason,
            now,
        )));
        events.push(AuditEvent::points(next.customer_id, points, reason));
    }

    let order_id = next.id;
    unit.push(Mutation::UpdateOrder {
        order: next,
        expected_status: current.status,
    });
    for posting in postings {
        unit.push(posting);
    }
    for event in events {
        unit.push(Mutation::AppendEvent(event.record(order_id, now)?));
    }

    Ok(unit)
}

#[cfg(test)]
mod tests {
    use common::{CustomerId, EstablishmentId, Money, OrderId};

    use super::*;
    use crate::audit::{LOYALTY_POINTS_EARNED, LOYALTY_POINTS_REFUNDED};
    use crate::state_machine::{self, Transition};

    fn order(status: OrderStatus, points: i64, total: i64) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            customer_id: CustomerId::new(),
            establishment_id: EstablishmentId::new(),
            coupon_code: None,
            loyalty_points_applied: points,
            subtotal: Money::from_cents(total),
            coupon_discount: Money::zero(),
            loyalty_discount: Money::zero(),
            total: Money::from_cents(total),
            status,
            ordered_at: now,
            processed_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    fn event_types(unit: &UnitOfWork) -> Vec<String> {
        unit.events().map(|e| e.event_type.clone()).collect()
    }

    fn transition(current: &Order, to: OrderStatus) -> UnitOfWork {
        let now = Utc::now();
        let (next, change) = state_machine::apply(current, &Transition::to(to), now).unwrap();
        plan_transition(current, next, change, &EngineConfig::default(), now).unwrap()
    }

    #[test]
    fn commit_with_coupon_and_points() {
        let mut draft_order = order(OrderStatus::Pending, 100, 2150);
        draft_order.coupon_code = Some("SAVE10".to_string());
        let draft = OrderDraft {
            order: draft_order,
            items: vec![],
        };

        let unit = plan_commit(&draft, Utc::now()).unwrap();
        assert!(unit.validate().is_ok());
        assert_eq!(
            event_types(&unit),
            ["PENDING", "COUPON_REDEEMED", "LOYALTY_POINTS_REDEEMED"]
        );
        assert!(matches!(unit.mutations()[0], Mutation::RedeemCoupon(_)));
        assert!(matches!(
            &unit.mutations()[1],
            Mutation::PostLoyalty(t) if t.delta == -100
        ));
        let first = unit.events().next().unwrap();
        assert!(first.payload["prior_status"].is_null());
    }

    #[test]
    fn plain_commit_has_one_event() {
        let draft = OrderDraft {
            order: order(OrderStatus::Pending, 0, 1000),
            items: vec![],
        };
        let unit = plan_commit(&draft, Utc::now()).unwrap();
        assert_eq!(event_types(&unit), ["PENDING"]);
        assert_eq!(unit.mutations().len(), 2);
    }

    #[test]
    fn completion_accrues_points() {
        let current = order(OrderStatus::Processing, 0, 2150);
        let unit = transition(&current, OrderStatus::Completed);

        assert_eq!(event_types(&unit), ["COMPLETED", LOYALTY_POINTS_EARNED]);
        assert!(unit.mutations().iter().any(
            |m| matches!(m, Mutation::PostLoyalty(t) if t.delta == 21 && t.reason == LoyaltyReason::Accrual)
        ));
    }

    #[test]
    fn completion_of_tiny_order_skips_accrual() {
        let current = order(OrderStatus::Processing, 0, 50);
        let unit = transition(&current, OrderStatus::Completed);
        assert_eq!(event_types(&unit), ["COMPLETED"]);
    }

    #[test]
    fn cancellation_refunds_redeemed_points() {
        let current = order(OrderStatus::Pending, 100, 1900);
        let unit = transition(&current, OrderStatus::Cancelled);
        assert_eq!(event_types(&unit), ["CANCELLED", LOYALTY_POINTS_REFUNDED]);

        let current = order(OrderStatus::Processing, 0, 1900);
        let unit = transition(&current, OrderStatus::Failed);
        assert_eq!(event_types(&unit), ["FAILED"]);
    }

    #[test]
    fn transition_expects_the_loaded_status() {
        let current = order(OrderStatus::Pending, 0, 100);
        let unit = transition(&current, OrderStatus::Processing);
        assert!(matches!(
            unit.mutations()[0],
            Mutation::UpdateOrder {
                expected_status: OrderStatus::Pending,
                ..
            }
        ));
    }
}
