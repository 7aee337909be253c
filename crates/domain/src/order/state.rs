//! Order status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// PendingPayment ──► Paid ──► Preparing ──► Shipped ──► Delivered
///       │             │           │
///       └─────────────┴───────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order was placed and stock reserved; waiting for payment.
    #[default]
    PendingPayment,

    /// Payment confirmed.
    Paid,

    /// Being picked and packed.
    Preparing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer (terminal state).
    Delivered,

    /// Cancelled before shipping (terminal state).
    Cancelled,
}

/// Legal forward transitions, one row per source status.
static TRANSITIONS: &[(OrderStatus, &[OrderStatus])] = &[
    (
        OrderStatus::PendingPayment,
        &[OrderStatus::Paid, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::Paid,
        &[OrderStatus::Preparing, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::Preparing,
        &[OrderStatus::Shipped, OrderStatus::Cancelled],
    ),
    (OrderStatus::Shipped, &[OrderStatus::Delivered]),
    (OrderStatus::Delivered, &[]),
    (OrderStatus::Cancelled, &[]),
];

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::PendingPayment,
        OrderStatus::Paid,
        OrderStatus::Preparing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Returns the statuses reachable from this one.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        TRANSITIONS
            .iter()
            .find(|(from, _)| from == self)
            .map(|(_, to)| *to)
            .unwrap_or(&[])
    }

    /// Returns true if moving to `next` is listed in the transition table.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if the order may still be cancelled.
    ///
    /// Cancellation is checked separately from the forward transitions.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::PendingPayment | OrderStatus::Paid | OrderStatus::Preparing
        )
    }

    /// Returns true if items can still be appended.
    pub fn can_modify_items(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns the status name as stored and displayed.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown order status: {s}"))
    }
}

/// The status of a single order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderItemStatus {
    #[default]
    Ordered,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderItemStatus::Ordered => "ORDERED",
            OrderItemStatus::Shipped => "SHIPPED",
            OrderItemStatus::Delivered => "DELIVERED",
            OrderItemStatus::Cancelled => "CANCELLED",
            OrderItemStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for OrderItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending_payment() {
        assert_eq!(OrderStatus::default(), OrderStatus::PendingPayment);
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;

        let legal = [
            (PendingPayment, Paid),
            (PendingPayment, Cancelled),
            (Paid, Preparing),
            (Paid, Cancelled),
            (Preparing, Shipped),
            (Preparing, Cancelled),
            (Shipped, Delivered),
        ];

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_can_cancel_matches_table() {
        for status in OrderStatus::ALL {
            assert_eq!(
                status.can_cancel(),
                status.can_transition_to(OrderStatus::Cancelled)
            );
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in OrderStatus::ALL {
            assert_eq!(
                status.is_terminal(),
                status.allowed_transitions().is_empty()
            );
        }
    }

    #[test]
    fn test_only_pending_payment_accepts_items() {
        assert!(OrderStatus::PendingPayment.can_modify_items());
        assert!(!OrderStatus::Paid.can_modify_items());
        assert!(!OrderStatus::Cancelled.can_modify_items());
    }

    #[test]
    fn test_display_and_parse() {
        assert_eq!(OrderStatus::PendingPayment.to_string(), "PENDING_PAYMENT");
        assert_eq!(
            "shipped".parse::<OrderStatus>().unwrap(),
            OrderStatus::Shipped
        );
        assert!("LOST".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&OrderStatus::PendingPayment).unwrap();
        assert_eq!(json, "\"PENDING_PAYMENT\"");
        let status: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, OrderStatus::PendingPayment);
    }
}
