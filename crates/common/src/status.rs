//! Order status and its transition table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of an order in its lifecycle.
///
/// ```text
/// Pending ──► Processing ──► Completed
///    │            │
///    └────────────┴──► Cancelled | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Committed, awaiting preparation.
    #[default]
    Pending,

    /// Being prepared by the establishment.
    Processing,

    /// Delivered to the customer (terminal).
    Completed,

    /// Cancelled by the customer or establishment (terminal).
    Cancelled,

    /// Could not be fulfilled (terminal).
    Failed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Failed,
    ];

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }

    /// Returns true if an order in this status may move to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Pending | Processing, Cancelled)
                | (Pending | Processing, Failed)
        )
    }

    /// Returns the status name as stored and emitted as an event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn default_is_pending() {
        assert_eq!(OrderStatus::default(), Pending);
    }

    #[test]
    fn happy_path_transitions() {
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
    }

    #[test]
    fn pending_cannot_skip_to_completed() {
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn cancel_and_fail_from_non_terminal() {
        for from in [Pending, Processing] {
            assert!(from.can_transition_to(Cancelled));
            assert!(from.can_transition_to(Failed));
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [Completed, Cancelled, Failed] {
            assert!(from.is_terminal());
            for to in OrderStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn self_transitions_are_rejected() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn parse_round_trips_names() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!("processing".parse::<OrderStatus>().unwrap(), Processing);
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn serializes_in_screaming_case() {
        assert_eq!(serde_json::to_string(&Cancelled).unwrap(), "\"CANCELLED\"");
    }
}
