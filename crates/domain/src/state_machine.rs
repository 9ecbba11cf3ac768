//! Order status transitions.

use chrono::{DateTime, Utc};
use common::{Order, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::audit::StatusChange;
use crate::error::{OrderError, Result};

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub status: OrderStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Who asked for the change, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl Transition {
    pub fn to(status: OrderStatus) -> Self {
        Self {
            status,
            reason: None,
            actor: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Applies `transition` to `order` at `at`.
///
/// Returns the updated order and the status change to record. The input is
/// left untouched, so a rejected transition has no effect.
pub fn apply(
    order: &Order,
    transition: &Transition,
    at: DateTime<Utc>,
) -> Result<(Order, StatusChange)> {
    let from = order.status;
    let to = transition.status;
    if !from.can_transition_to(to) {
        return Err(OrderError::InvalidTransition { from, to });
    }

    let mut next = order.clone();
    next.status = to;
    next.updated_at = at;
    match to {
        OrderStatus::Processing => next.processed_at = Some(at),
        OrderStatus::Completed => next.completed_at = Some(at),
        _ => {}
    }

    let change = StatusChange {
        status: to,
        prior_status: Some(from),
        reason: transition.reason.clone(),
        actor: transition.actor.clone(),
    };
    Ok((next, change))
}
