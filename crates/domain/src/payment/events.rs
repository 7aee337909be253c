//! Payment domain events.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;

use super::PaymentMethod;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PaymentEvent {
    PaymentRequested(PaymentRequestedData),
    PaymentCompleted(PaymentCompletedData),
    PaymentFailed(PaymentFailedData),
    PaymentCancelled(PaymentCancelledData),
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentRequested(_) => "PaymentRequested",
            PaymentEvent::PaymentCompleted(_) => "PaymentCompleted",
            PaymentEvent::PaymentFailed(_) => "PaymentFailed",
            PaymentEvent::PaymentCancelled(_) => "PaymentCancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequestedData {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub amount: Money,
    pub transaction_id: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCompletedData {
    pub pg_transaction_id: String,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCancelledData {
    pub cancelled_at: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn payment_completed(pg_transaction_id: impl Into<String>) -> Self {
        PaymentEvent::PaymentCompleted(PaymentCompletedData {
            pg_transaction_id: pg_transaction_id.into(),
            paid_at: Utc::now(),
        })
    }

    pub fn payment_failed(reason: impl Into<String>) -> Self {
        PaymentEvent::PaymentFailed(PaymentFailedData {
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }

    pub fn payment_cancelled() -> Self {
        PaymentEvent::PaymentCancelled(PaymentCancelledData {
            cancelled_at: Utc::now(),
        })
    }
}
