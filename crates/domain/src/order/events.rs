//! Order domain events.

use chrono::{DateTime, Utc};
use common::{MemberCouponId, MemberId, OrderId, OrderItemId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;
use crate::payment::PaymentMethod;

use super::{OrderItem, ShippingAddress};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order header was placed.
    OrderCreated(OrderCreatedData),

    /// A line was appended.
    ItemAdded(ItemAddedData),

    /// Payment was confirmed for the order.
    OrderPaid(OrderPaidData),

    /// Fulfillment started.
    PreparationStarted(PreparationStartedData),

    /// Order was handed to the carrier.
    OrderShipped(OrderShippedData),

    /// Order reached the customer.
    OrderDelivered(OrderDeliveredData),

    /// Whole order was cancelled.
    OrderCancelled(OrderCancelledData),

    /// A single line was cancelled.
    ItemCancelled(ItemCancelledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::ItemAdded(_) => "ItemAdded",
            OrderEvent::OrderPaid(_) => "OrderPaid",
            OrderEvent::PreparationStarted(_) => "PreparationStarted",
            OrderEvent::OrderShipped(_) => "OrderShipped",
            OrderEvent::OrderDelivered(_) => "OrderDelivered",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::ItemCancelled(_) => "ItemCancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: OrderId,
    pub order_number: String,
    pub member_id: MemberId,
    pub shipping_address: ShippingAddress,
    pub shipping_fee: Money,
    pub discount_amount: Money,
    pub member_coupon_id: Option<MemberCouponId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAddedData {
    pub item: OrderItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaidData {
    pub payment_method: PaymentMethod,
    pub transaction_id: String,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparationStartedData {
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderShippedData {
    pub tracking_number: String,
    pub shipped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDeliveredData {
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCancelledData {
    pub item_id: OrderItemId,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

// Event constructors
impl OrderEvent {
    pub fn item_added(item: OrderItem) -> Self {
        OrderEvent::ItemAdded(ItemAddedData { item })
    }

    pub fn order_paid(payment_method: PaymentMethod, transaction_id: impl Into<String>) -> Self {
        OrderEvent::OrderPaid(OrderPaidData {
            payment_method,
            transaction_id: transaction_id.into(),
            paid_at: Utc::now(),
        })
    }

    pub fn preparation_started() -> Self {
        OrderEvent::PreparationStarted(PreparationStartedData {
            started_at: Utc::now(),
        })
    }

    pub fn order_shipped(tracking_number: impl Into<String>) -> Self {
        OrderEvent::OrderShipped(OrderShippedData {
            tracking_number: tracking_number.into(),
            shipped_at: Utc::now(),
        })
    }

    pub fn order_delivered() -> Self {
        OrderEvent::OrderDelivered(OrderDeliveredData {
            delivered_at: Utc::now(),
        })
    }

    pub fn order_cancelled(reason: impl Into<String>) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            reason: reason.into(),
            cancelled_at: Utc::now(),
        })
    }

    pub fn item_cancelled(item_id: OrderItemId, reason: impl Into<String>) -> Self {
        OrderEvent::ItemCancelled(ItemCancelledData {
            item_id,
            reason: reason.into(),
            cancelled_at: Utc::now(),
        })
    }
}
