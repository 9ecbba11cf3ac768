//! The order audit trail.
//!
//! Every status change and every ledger mutation is recorded as exactly one
//! [`OrderEvent`]. Status events use the new status as their type; ledger
//! events use the constants below.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{
    CustomerId, LoyaltyReason, Money, NewOrderEvent, OrderEvent, OrderId, OrderStatus,
};
use serde::{Deserialize, Serialize};

use crate::error::{OrderError, Result};

pub const COUPON_REDEEMED: &str = "COUPON_REDEEMED";
pub const LOYALTY_POINTS_REDEEMED: &str = "LOYALTY_POINTS_REDEEMED";
pub const LOYALTY_POINTS_EARNED: &str = "LOYALTY_POINTS_EARNED";
pub const LOYALTY_POINTS_REFUNDED: &str = "LOYALTY_POINTS_REFUNDED";

/// Payload of a status event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,

    /// `None` only for the event that creates the order.
    pub prior_status: Option<OrderStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// Payload of a coupon redemption event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRedeemed {
    pub coupon_code: String,
    pub customer_id: CustomerId,
    pub discount: Money,
}

/// Payload of a loyalty ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsPosted {
    pub customer_id: CustomerId,

    /// Signed change of the balance.
    pub delta: i64,
    pub reason: LoyaltyReason,
}

/// A typed audit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    StatusChanged(StatusChange),
    CouponRedeemed(CouponRedeemed),
    LoyaltyPointsRedeemed(PointsPosted),
    LoyaltyPointsEarned(PointsPosted),
    LoyaltyPointsRefunded(PointsPosted),
}

impl AuditEvent {
    /// A loyalty posting event, typed by its reason.
    pub fn points(customer_id: CustomerId, delta: i64, reason: LoyaltyReason) -> Self {
        let posted = PointsPosted {
            customer_id,
            delta,
            reason,
        };
        match reason {
            LoyaltyReason::Redemption => AuditEvent::LoyaltyPointsRedeemed(posted),
            LoyaltyReason::Refund => AuditEvent::LoyaltyPointsRefunded(posted),
            LoyaltyReason::Accrual | LoyaltyReason::OpeningBalance => {
                AuditEvent::LoyaltyPointsEarned(posted)
            }
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::StatusChanged(change) => change.status.as_str(),
            AuditEvent::CouponRedeemed(_) => COUPON_REDEEMED,
            AuditEvent::LoyaltyPointsRedeemed(_) => LOYALTY_POINTS_REDEEMED,
            AuditEvent::LoyaltyPointsEarned(_) => LOYALTY_POINTS_EARNED,
            AuditEvent::LoyaltyPointsRefunded(_) => LOYALTY_POINTS_REFUNDED,
        }
    }

    /// Encodes the event for appending to `order_id`'s trail.
    pub fn record(&self, order_id: OrderId, at: DateTime<Utc>) -> Result<NewOrderEvent> {
        let payload = match self {
            AuditEvent::StatusChanged(change) => serde_json::to_value(change)?,
            AuditEvent::CouponRedeemed(redeemed) => serde_json::to_value(redeemed)?,
            AuditEvent::LoyaltyPointsRedeemed(posted)
            | AuditEvent::LoyaltyPointsEarned(posted)
            | AuditEvent::LoyaltyPointsRefunded(posted) => serde_json::to_value(posted)?,
        };
        Ok(NewOrderEvent::new(order_id, self.event_type(), payload, at))
    }

    /// Decodes a stored event.
    pub fn decode(event: &OrderEvent) -> Result<Self> {
        let payload = event.payload.clone();
        let decoded = match event.event_type.as_str() {
            COUPON_REDEEMED => AuditEvent::CouponRedeemed(serde_json::from_value(payload)?),
            LOYALTY_POINTS_REDEEMED => {
                AuditEvent::LoyaltyPointsRedeemed(serde_json::from_value(payload)?)
            }
            LOYALTY_POINTS_EARNED => {
                AuditEvent::LoyaltyPointsEarned(serde_json::from_value(payload)?)
            }
            LOYALTY_POINTS_REFUNDED => {
                AuditEvent::LoyaltyPointsRefunded(serde_json::from_value(payload)?)
            }
            other => {
                let status = OrderStatus::from_str(other).map_err(|_| {
                    OrderError::InvalidHistory(format!("unknown event type {other}"))
                })?;
                let change: StatusChange = serde_json::from_value(payload)?;
                if change.status != status {
                    return Err(OrderError::InvalidHistory(format!(
                        "event {} has type {other} but payload status {}",
                        event.sequence, change.status
                    )));
                }
                AuditEvent::StatusChanged(change)
            }
        };
        Ok(decoded)
    }
}

/// One step of an order's status timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// An order's history rebuilt from its audit trail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHistory {
    pub timeline: Vec<TimelineEntry>,
    pub coupon_code: Option<String>,
    pub coupon_discount: Money,

    /// Net change of the customer's balance caused by this order.
    pub loyalty_delta: i64,
    pub event_count: usize,
}

impl OrderHistory {
    /// Replays `events` in (timestamp, sequence) order.
    ///
    /// Fails if the status events do not form a legal lifecycle starting at
    /// `PENDING`, or if a status event's prior status does not match the
    /// status before it.
    pub fn replay(events: &[OrderEvent]) -> Result<Self> {
        let mut ordered: Vec<&OrderEvent> = events.iter().collect();
        ordered.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.sequence.cmp(&b.sequence))
        });

        let mut history = OrderHistory::default();
        for event in ordered {
            history.apply(event)?;
        }
        Ok(history)
    }

    /// The status after the last replayed status event.
    pub fn status(&self) -> Option<OrderStatus> {
        self.timeline.last().map(|entry| entry.status)
    }

    fn apply(&mut self, event: &OrderEvent) -> Result<()> {
        match AuditEvent::decode(event)? {
            AuditEvent::StatusChanged(change) => {
                let current = self.status();
                if change.prior_status != current {
                    return Err(OrderError::InvalidHistory(format!(
                        "event {} expects prior status {:?}, order was {:?}",
                        event.sequence, change.prior_status, current
                    )));
                }
                let legal = match current {
                    None => change.status == OrderStatus::Pending,
                    Some(from) => from.can_transition_to(change.status),
                };
                if !legal {
                    return Err(OrderError::InvalidHistory(format!(
                        "event {} moves {:?} to {}",
                        event.sequence, current, change.status
                    )));
                }
                self.timeline.push(TimelineEntry {
                    status: change.status,
                    at: event.created_at,
                    reason: change.reason,
                    actor: change.actor,
                });
            }
            AuditEvent::CouponRedeemed(redeemed) => {
                self.coupon_code = Some(redeemed.coupon_code);
                self.coupon_discount = redeemed.discount;
            }
            AuditEvent::LoyaltyPointsRedeemed(posted)
            | AuditEvent::LoyaltyPointsEarned(posted)
            | AuditEvent::LoyaltyPointsRefunded(posted) => {
                self.loyalty_delta += posted.delta;
            }
        }
        self.event_count += 1;
        Ok(())
    }
}
