//! Payment workflow: request, confirmation against the gateway, refund.

use common::{OrderId, PaymentId};
use domain::{
    Aggregate, Money, Order, OrderStatus, Payment, PaymentError, PaymentEvent, PaymentMethod,
};
use store::Store;

use crate::error::{Result, WorkflowError};
use crate::requester::Requester;
use crate::services::{GatewayResult, Notification, Notifier, PaymentGateway};

/// Drives payments for orders.
///
/// Confirmation is a two-aggregate write: the payment completes and the
/// order becomes paid in one `save_settlement` call. When that write cannot
/// happen after the gateway already took the money, the charge is refunded.
pub struct PaymentWorkflowService<S, G, N>
where
    S: Store,
    G: PaymentGateway,
    N: Notifier,
{
    store: S,
    gateway: G,
    notifier: N,
}

impl<S, G, N> PaymentWorkflowService<S, G, N>
where
    S: Store,
    G: PaymentGateway,
    N: Notifier,
{
    pub fn new(store: S, gateway: G, notifier: N) -> Self {
        Self {
            store,
            gateway,
            notifier,
        }
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| WorkflowError::OrderNotFound(order_id.to_string()))
    }

    async fn load_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.store
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| WorkflowError::PaymentNotFound(payment_id.to_string()))
    }

    /// Opens a pending payment for the order's total.
    #[tracing::instrument(skip(self, requester), fields(member_id = %requester.member_id))]
    pub async fn request_payment(
        &self,
        order_id: OrderId,
        method: PaymentMethod,
        requester: Requester,
    ) -> Result<Payment> {
        let order = self.load_order(order_id).await?;
        if !requester.can_access(order.member_id()) {
            return Err(WorkflowError::Forbidden("Not authorized to access this order"));
        }
        if order.status() != OrderStatus::PendingPayment {
            return Err(WorkflowError::OrderNotPayable {
                status: order.status(),
            });
        }

        let (mut payment, events) = Payment::request(order_id, method, order.total_amount())?;
        let version = self.store.save_payment(&payment, &events).await?;
        payment.set_version(version);

        metrics::counter!("payments_requested_total").increment(1);
        tracing::info!(
            payment_id = %payment.id(),
            transaction_id = payment.transaction_id(),
            amount = %payment.amount(),
            "payment requested"
        );
        Ok(payment)
    }

    /// Confirms a pending payment with the gateway.
    ///
    /// A gateway decline or transport failure is recorded on the payment as
    /// `FAILED` and returned as `Ok`; the order stays `PENDING_PAYMENT`.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, transaction_id: &str, amount: Money) -> Result<Payment> {
        let mut payment = self
            .store
            .find_payment_by_transaction_id(transaction_id)
            .await?
            .ok_or_else(|| WorkflowError::PaymentNotFound(transaction_id.to_string()))?;

        payment.ensure_confirmable()?;
        payment.verify_amount(amount)?;

        let started = std::time::Instant::now();
        let outcome = self.gateway.confirm_payment(transaction_id, amount).await;
        metrics::histogram!("gateway_request_duration_seconds", "operation" => "confirm")
            .record(started.elapsed().as_secs_f64());

        let reason = match outcome {
            Ok(GatewayResult::Success { pg_transaction_id }) => {
                return self.settle(payment, &pg_transaction_id).await;
            }
            Ok(GatewayResult::Failure { reason }) => reason,
            Err(e) => {
                tracing::warn!(transaction_id, error = %e, "gateway call failed during confirmation");
                e.to_string()
            }
        };

        let events = payment.execute(|p| p.fail(reason.clone()))?;
        let version = self.store.save_payment(&payment, &events).await?;
        payment.set_version(version);

        metrics::counter!("payments_failed_total").increment(1);
        tracing::info!(payment_id = %payment.id(), reason = %reason, "payment failed");
        Ok(payment)
    }

    /// Completes the payment and marks its order paid in one write.
    async fn settle(&self, pending: Payment, pg_transaction_id: &str) -> Result<Payment> {
        let mut order = match self.load_order(pending.order_id()).await {
            Ok(order) => order,
            Err(e) => return Err(self.compensate(&pending, pg_transaction_id, e).await),
        };

        let mut payment = pending.clone();
        let payment_events = payment.execute(|p| p.complete(pg_transaction_id))?;
        let order_events = match order
            .execute(|o| o.mark_as_paid(pending.method(), pending.transaction_id()))
        {
            Ok(events) => events,
            Err(e) => return Err(self.compensate(&pending, pg_transaction_id, e.into()).await),
        };

        match self
            .store
            .save_settlement(&payment, &payment_events, &order, &order_events)
            .await
        {
            Ok((payment_version, order_version)) => {
                payment.set_version(payment_version);
                order.set_version(order_version);
            }
            Err(e) => return Err(self.compensate(&pending, pg_transaction_id, e.into()).await),
        }

        metrics::counter!("payments_completed_total").increment(1);
        tracing::info!(
            payment_id = %payment.id(),
            order_id = %order.id(),
            pg_transaction_id,
            "payment completed"
        );

        let notification = Notification::PaymentCompleted {
            member_id: order.member_id(),
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            amount: payment.amount(),
        };
        if let Err(e) = self.notifier.notify(notification).await {
            metrics::counter!("notifications_failed_total").increment(1);
            tracing::warn!(order_id = %order.id(), error = %e, "payment notification failed");
        }
        Ok(payment)
    }

    /// Refunds a charge that could not be settled and records what happened.
    ///
    /// Returns `cause` so the caller can hand it back.
    async fn compensate(
        &self,
        pending: &Payment,
        pg_transaction_id: &str,
        cause: WorkflowError,
    ) -> WorkflowError {
        tracing::warn!(
            payment_id = %pending.id(),
            pg_transaction_id,
            error = %cause,
            "settlement failed after gateway approval, refunding"
        );

        let refund = self
            .gateway
            .cancel_payment(pg_transaction_id, pending.amount())
            .await;

        let mut payment = pending.clone();
        let (outcome, events) = match refund {
            Ok(GatewayResult::Success { .. }) => {
                ("refunded", complete_and_cancel(&mut payment, pg_transaction_id))
            }
            Ok(GatewayResult::Failure { reason }) => {
                tracing::error!(pg_transaction_id, reason = %reason, "refund declined after failed settlement");
                let reason = format!("Settlement failed and refund was declined for {pg_transaction_id}");
                ("refund_failed", payment.execute(|p| p.fail(reason)))
            }
            Err(e) => {
                tracing::error!(pg_transaction_id, error = %e, "refund failed after failed settlement");
                let reason = format!("Settlement failed and refund was not possible for {pg_transaction_id}");
                ("refund_failed", payment.execute(|p| p.fail(reason)))
            }
        };
        metrics::counter!("payment_compensations_total", "outcome" => outcome).increment(1);

        let saved = match events {
            Ok(events) => self
                .store
                .save_payment(&payment, &events)
                .await
                .map_err(WorkflowError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = saved {
            tracing::error!(payment_id = %pending.id(), error = %e, "could not record compensation");
        }
        cause
    }

    /// Refunds a completed payment. Only the order's owner may do this.
    #[tracing::instrument(skip(self, requester), fields(member_id = %requester.member_id))]
    pub async fn cancel_payment(&self, payment_id: PaymentId, requester: Requester) -> Result<Payment> {
        let mut payment = self.load_payment(payment_id).await?;
        let order = self.load_order(payment.order_id()).await?;
        if !order.is_owned_by(requester.member_id) {
            return Err(WorkflowError::Forbidden("Not authorized to cancel this payment"));
        }

        let events = payment.execute(|p| p.cancel())?;
        let pg_reference = payment
            .pg_transaction_id()
            .unwrap_or(payment.transaction_id())
            .to_string();

        let started = std::time::Instant::now();
        let outcome = self.gateway.cancel_payment(&pg_reference, payment.amount()).await;
        metrics::histogram!("gateway_request_duration_seconds", "operation" => "cancel")
            .record(started.elapsed().as_secs_f64());

        match outcome? {
            GatewayResult::Success { .. } => {}
            GatewayResult::Failure { reason } => return Err(WorkflowError::RefundDeclined(reason)),
        }

        let version = self.store.save_payment(&payment, &events).await?;
        payment.set_version(version);

        metrics::counter!("payments_cancelled_total").increment(1);
        tracing::info!(%payment_id, "payment cancelled");
        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: PaymentId, requester: Requester) -> Result<Payment> {
        let payment = self.load_payment(payment_id).await?;
        let order = self.load_order(payment.order_id()).await?;
        if !requester.can_access(order.member_id()) {
            return Err(WorkflowError::Forbidden("Not authorized to access this payment"));
        }
        Ok(payment)
    }

    /// Payments for an order, newest first.
    pub async fn get_payments_by_order(
        &self,
        order_id: OrderId,
        requester: Requester,
    ) -> Result<Vec<Payment>> {
        let order = self.load_order(order_id).await?;
        if !requester.can_access(order.member_id()) {
            return Err(WorkflowError::Forbidden("Not authorized to access this order"));
        }
        Ok(self.store.find_payments_by_order(order_id).await?)
    }
}

/// A refunded charge: the payment completes and is immediately cancelled.
fn complete_and_cancel(
    payment: &mut Payment,
    pg_transaction_id: &str,
) -> std::result::Result<Vec<PaymentEvent>, PaymentError> {
    let mut events = payment.execute(|p| p.complete(pg_transaction_id))?;
    events.extend(payment.execute(|p| p.cancel())?);
    Ok(events)
}
