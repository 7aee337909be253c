//! Payment aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, OrderId, PaymentId, Version};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::money::Money;

use super::{PaymentError, PaymentEvent, PaymentMethod, PaymentStatus, events::PaymentRequestedData};

/// A single payment attempt for an order.
///
/// The amount and internal transaction id are fixed when the payment is
/// requested and never change afterwards, whatever the gateway answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,

    #[serde(default)]
    version: Version,

    order_id: OrderId,
    method: PaymentMethod,
    amount: Money,
    status: PaymentStatus,
    transaction_id: String,
    pg_transaction_id: Option<String>,
    fail_reason: Option<String>,

    paid_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Aggregate for Payment {
    type Event = PaymentEvent;
    type Error = PaymentError;

    fn aggregate_type() -> &'static str {
        "Payment"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.into()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            PaymentEvent::PaymentRequested(data) => {
                self.id = data.payment_id;
                self.order_id = data.order_id;
                self.method = data.method;
                self.amount = data.amount;
                self.transaction_id = data.transaction_id;
                self.status = PaymentStatus::Pending;
                self.created_at = data.requested_at;
                self.updated_at = data.requested_at;
            }
            PaymentEvent::PaymentCompleted(data) => {
                self.status = PaymentStatus::Completed;
                self.pg_transaction_id = Some(data.pg_transaction_id);
                self.paid_at = Some(data.paid_at);
                self.updated_at = data.paid_at;
            }
            PaymentEvent::PaymentFailed(data) => {
                self.status = PaymentStatus::Failed;
                self.fail_reason = Some(data.reason);
                self.updated_at = data.failed_at;
            }
            PaymentEvent::PaymentCancelled(data) => {
                self.status = PaymentStatus::Cancelled;
                self.cancelled_at = Some(data.cancelled_at);
                self.updated_at = data.cancelled_at;
            }
        }
    }
}

impl Payment {
    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    /// Internal reference, `PAY-` followed by 12 hex characters.
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Gateway reference, set once the payment completes.
    pub fn pg_transaction_id(&self) -> Option<&str> {
        self.pg_transaction_id.as_deref()
    }

    pub fn fail_reason(&self) -> Option<&str> {
        self.fail_reason.as_deref()
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Payment {
    /// Opens a pending payment for `amount`.
    pub fn request(
        order_id: OrderId,
        method: PaymentMethod,
        amount: Money,
    ) -> Result<(Payment, Vec<PaymentEvent>), PaymentError> {
        if amount.is_negative() {
            return Err(PaymentError::NegativeAmount { amount });
        }

        let events = vec![PaymentEvent::PaymentRequested(PaymentRequestedData {
            payment_id: PaymentId::new(),
            order_id,
            method,
            amount,
            transaction_id: generate_transaction_id(),
            requested_at: Utc::now(),
        })];

        let mut payment = Payment::default();
        payment.apply_events(events.clone());
        Ok((payment, events))
    }

    /// Fails unless the payment is still waiting for confirmation.
    pub fn ensure_confirmable(&self) -> Result<(), PaymentError> {
        if !self.status.can_confirm() {
            return Err(PaymentError::AlreadyProcessed {
                status: self.status,
            });
        }
        Ok(())
    }

    /// Fails when the confirmed amount differs from the requested one.
    pub fn verify_amount(&self, amount: Money) -> Result<(), PaymentError> {
        if amount != self.amount {
            return Err(PaymentError::AmountMismatch {
                expected: self.amount,
                actual: amount,
            });
        }
        Ok(())
    }

    pub fn complete(
        &self,
        pg_transaction_id: impl Into<String>,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_transition(PaymentStatus::Completed)?;
        Ok(vec![PaymentEvent::payment_completed(pg_transaction_id)])
    }

    pub fn fail(&self, reason: impl Into<String>) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_transition(PaymentStatus::Failed)?;
        Ok(vec![PaymentEvent::payment_failed(reason)])
    }

    /// Records a refund of a completed payment.
    pub fn cancel(&self) -> Result<Vec<PaymentEvent>, PaymentError> {
        if !self.status.can_cancel() {
            return Err(PaymentError::NotCancellable {
                status: self.status,
            });
        }
        Ok(vec![PaymentEvent::payment_cancelled()])
    }

    fn ensure_transition(&self, to: PaymentStatus) -> Result<(), PaymentError> {
        if !self.status.can_transition_to(to) {
            return Err(PaymentError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}

fn generate_transaction_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("PAY-{}", hex[..12].to_uppercase())
}
