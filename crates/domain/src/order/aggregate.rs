//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, MemberCouponId, MemberId, OrderId, OrderItemId, Version};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::money::Money;
use crate::payment::PaymentMethod;

use super::{
    AddItem, CreateOrder, OrderError, OrderEvent, OrderItem, OrderItemStatus, OrderStatus,
    ShippingAddress,
    events::{ItemCancelledData, OrderCancelledData, OrderCreatedData, OrderPaidData},
};

/// Order aggregate root.
///
/// Owns the header, the shipping snapshot and the lines, and guards every
/// status change with the transition table in [`OrderStatus`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,

    /// Current version for optimistic concurrency.
    #[serde(default)]
    version: Version,

    order_number: String,
    member_id: MemberId,
    status: OrderStatus,
    shipping_address: ShippingAddress,
    items: Vec<OrderItem>,

    payment_method: Option<PaymentMethod>,
    payment_transaction_id: Option<String>,
    tracking_number: Option<String>,
    cancel_reason: Option<String>,

    paid_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,

    shipping_fee: Money,
    discount_amount: Money,
    total_amount: Money,
    member_coupon_id: Option<MemberCouponId>,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
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
            OrderEvent::OrderCreated(data) => self.apply_order_created(data),
            OrderEvent::ItemAdded(data) => {
                self.items.push(data.item);
                self.recalculate_total();
            }
            OrderEvent::OrderPaid(data) => self.apply_order_paid(data),
            OrderEvent::PreparationStarted(data) => {
                self.status = OrderStatus::Preparing;
                self.updated_at = data.started_at;
            }
            OrderEvent::OrderShipped(data) => {
                self.status = OrderStatus::Shipped;
                self.tracking_number = Some(data.tracking_number);
                self.shipped_at = Some(data.shipped_at);
                self.updated_at = data.shipped_at;
                self.cascade_to_active_items(OrderItemStatus::Shipped);
            }
            OrderEvent::OrderDelivered(data) => {
                self.status = OrderStatus::Delivered;
                self.delivered_at = Some(data.delivered_at);
                self.updated_at = data.delivered_at;
                self.cascade_to_active_items(OrderItemStatus::Delivered);
            }
            OrderEvent::OrderCancelled(data) => self.apply_order_cancelled(data),
            OrderEvent::ItemCancelled(data) => self.apply_item_cancelled(data),
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Human-facing number, `ORD-` followed by 8 hex characters.
    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address
    }

    pub fn full_address(&self) -> String {
        self.shipping_address.full_address()
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn item(&self, item_id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id() == item_id)
    }

    /// Lines whose stock is still held by this order.
    pub fn active_items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(|item| !item.is_cancelled())
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn payment_transaction_id(&self) -> Option<&str> {
        self.payment_transaction_id.as_deref()
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn shipping_fee(&self) -> Money {
        self.shipping_fee
    }

    pub fn discount_amount(&self) -> Money {
        self.discount_amount
    }

    /// Sum of every line's unit price times quantity.
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(OrderItem::subtotal).sum()
    }

    /// `subtotal + shipping_fee - discount_amount`, not clamped.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn member_coupon_id(&self) -> Option<MemberCouponId> {
        self.member_coupon_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_owned_by(&self, member_id: MemberId) -> bool {
        self.member_id == member_id
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_cancel(&self) -> bool {
        self.status.can_cancel()
    }
}

// Command methods (return events)
impl Order {
    /// Places a new order in `PENDING_PAYMENT` with zero totals.
    pub fn create(cmd: CreateOrder) -> Result<(Order, Vec<OrderEvent>), OrderError> {
        cmd.shipping_address.validate()?;

        let shipping_fee = cmd.shipping_fee.unwrap_or_default();
        let discount_amount = cmd.discount_amount.unwrap_or_default();
        if shipping_fee.is_negative() {
            return Err(OrderError::NegativeAmount {
                field: "shipping_fee",
                amount: shipping_fee,
            });
        }
        if discount_amount.is_negative() {
            return Err(OrderError::NegativeAmount {
                field: "discount_amount",
                amount: discount_amount,
            });
        }

        let events = vec![OrderEvent::OrderCreated(OrderCreatedData {
            order_id: cmd.order_id,
            order_number: generate_order_number(),
            member_id: cmd.member_id,
            shipping_address: cmd.shipping_address,
            shipping_fee,
            discount_amount,
            member_coupon_id: cmd.member_coupon_id,
            created_at: Utc::now(),
        })];

        let mut order = Order::default();
        order.apply_events(events.clone());
        Ok((order, events))
    }

    /// Appends a line and recalculates the total.
    ///
    /// Fails with `AmountOverflow` if the new subtotal plus shipping would not
    /// fit in `Money`.
    pub fn add_item(&self, cmd: AddItem) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.status.can_modify_items() {
            return Err(OrderError::ItemsLocked {
                status: self.status,
            });
        }

        let item = cmd.to_item()?;
        self.subtotal()
            .checked_add(item.subtotal())
            .and_then(|subtotal| subtotal.checked_add(self.shipping_fee))
            .ok_or(OrderError::AmountOverflow)?;
        Ok(vec![OrderEvent::item_added(item)])
    }

    /// Fails unless the order holds at least one line.
    pub fn validate_for_placement(&self) -> Result<(), OrderError> {
        if !self.has_items() {
            return Err(OrderError::NoItems);
        }
        Ok(())
    }

    /// Records payment and moves the order to `PAID`.
    pub fn mark_as_paid(
        &self,
        payment_method: PaymentMethod,
        transaction_id: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Paid)?;
        Ok(vec![OrderEvent::order_paid(payment_method, transaction_id)])
    }

    pub fn start_preparing(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Preparing)?;
        Ok(vec![OrderEvent::preparation_started()])
    }

    /// Ships the order; every non-cancelled line follows.
    pub fn ship(&self, tracking_number: &str) -> Result<Vec<OrderEvent>, OrderError> {
        let tracking_number = tracking_number.trim();
        if tracking_number.is_empty() {
            return Err(OrderError::TrackingNumberRequired);
        }
        self.ensure_transition(OrderStatus::Shipped)?;
        Ok(vec![OrderEvent::order_shipped(tracking_number)])
    }

    /// Marks delivery; every non-cancelled line follows.
    pub fn deliver(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Delivered)?;
        Ok(vec![OrderEvent::order_delivered()])
    }

    /// Cancels the whole order. All lines become `CANCELLED`.
    pub fn cancel(&self, reason: impl Into<String>) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::CannotCancel {
                status: self.status,
            });
        }
        Ok(vec![OrderEvent::order_cancelled(reason)])
    }

    /// Cancels one line while the order is still cancellable.
    ///
    /// The order status itself is left as is, even if no active line remains.
    pub fn cancel_item(
        &self,
        item_id: OrderItemId,
        reason: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let item = self
            .item(item_id)
            .ok_or(OrderError::ItemNotFound { item_id })?;

        if !self.status.can_cancel() {
            return Err(OrderError::CannotCancel {
                status: self.status,
            });
        }
        if item.status() != OrderItemStatus::Ordered {
            return Err(OrderError::ItemNotCancellable {
                item_id,
                status: item.status(),
            });
        }

        Ok(vec![OrderEvent::item_cancelled(item_id, reason)])
    }

    fn ensure_transition(&self, to: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}

// Apply event helpers
impl Order {
    fn apply_order_created(&mut self, data: OrderCreatedData) {
        self.id = data.order_id;
        self.order_number = data.order_number;
        self.member_id = data.member_id;
        self.status = OrderStatus::PendingPayment;
        self.shipping_address = data.shipping_address;
        self.shipping_fee = data.shipping_fee;
        self.discount_amount = data.discount_amount;
        self.member_coupon_id = data.member_coupon_id;
        self.created_at = data.created_at;
        self.updated_at = data.created_at;
        self.recalculate_total();
    }

    fn apply_order_paid(&mut self, data: OrderPaidData) {
        self.status = OrderStatus::Paid;
        self.payment_method = Some(data.payment_method);
        self.payment_transaction_id = Some(data.transaction_id);
        self.paid_at = Some(data.paid_at);
        self.updated_at = data.paid_at;
    }

    fn apply_order_cancelled(&mut self, data: OrderCancelledData) {
        self.status = OrderStatus::Cancelled;
        self.cancel_reason = Some(data.reason);
        self.cancelled_at = Some(data.cancelled_at);
        self.updated_at = data.cancelled_at;
        for item in &mut self.items {
            item.set_status(OrderItemStatus::Cancelled);
        }
    }

    fn apply_item_cancelled(&mut self, data: ItemCancelledData) {
        if let Some(item) = self.items.iter_mut().find(|i| i.id() == data.item_id) {
            item.set_status(OrderItemStatus::Cancelled);
        }
        self.updated_at = data.cancelled_at;
    }

    fn cascade_to_active_items(&mut self, status: OrderItemStatus) {
        for item in self.items.iter_mut().filter(|i| !i.is_cancelled()) {
            item.set_status(status);
        }
    }

    fn recalculate_total(&mut self) {
        self.total_amount = self.subtotal() + self.shipping_fee - self.discount_amount;
    }
}

fn generate_order_number() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", hex[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;

    fn address() -> ShippingAddress {
        ShippingAddress::new("Lee Jiwoo", "010-2222-3333", "04524", "Sejong-daero 110", None)
    }

    fn create_order(fee: i64, discount: i64) -> Order {
        let cmd = CreateOrder::new(MemberId::new(), address())
            .with_shipping_fee(Money::new(fee))
            .with_discount(Money::new(discount));
        let (order, _) = Order::create(cmd).unwrap();
        order
    }

    fn order_with_item() -> Order {
        let mut order = create_order(3000, 0);
        order
            .execute(|o| o.add_item(AddItem::new(ProductId::new(), "Hoodie", Money::new(29000), 2)))
            .unwrap();
        order
    }

    fn order_in(status: OrderStatus) -> Order {
        let mut order = order_with_item();
        let path: &[OrderStatus] = match status {
            OrderStatus::PendingPayment => &[],
            OrderStatus::Paid => &[OrderStatus::Paid],
            OrderStatus::Preparing => &[OrderStatus::Paid, OrderStatus::Preparing],
            OrderStatus::Shipped => &[
                OrderStatus::Paid,
                OrderStatus::Preparing,
                OrderStatus::Shipped,
            ],
            OrderStatus::Delivered => &[
                OrderStatus::Paid,
                OrderStatus::Preparing,
                OrderStatus::Shipped,
                OrderStatus::Delivered,
            ],
            OrderStatus::Cancelled => &[OrderStatus::Cancelled],
        };
        for step in path {
            order.execute(|o| o.transition(*step)).unwrap();
        }
        order
    }

    impl Order {
        fn transition(&self, to: OrderStatus) -> Result<Vec<OrderEvent>, OrderError> {
            match to {
                OrderStatus::Paid => self.mark_as_paid(PaymentMethod::CreditCard, "PAY-TEST"),
                OrderStatus::Preparing => self.start_preparing(),
                OrderStatus::Shipped => self.ship("TRK-1"),
                OrderStatus::Delivered => self.deliver(),
                OrderStatus::Cancelled => self.cancel("test"),
                OrderStatus::PendingPayment => Err(OrderError::InvalidTransition {
                    from: self.status,
                    to,
                }),
            }
        }
    }

    #[test]
    fn test_create_order() {
        let order = create_order(0, 0);
        assert_eq!(order.status(), OrderStatus::PendingPayment);
        assert!(order.order_number().starts_with("ORD-"));
        assert_eq!(order.order_number().len(), 12);
        assert_eq!(order.total_amount(), Money::zero());
        assert!(!order.has_items());
    }

    #[test]
    fn test_create_with_negative_fee_fails() {
        let cmd = CreateOrder::new(MemberId::new(), address()).with_shipping_fee(Money::new(-1));
        assert!(matches!(
            Order::create(cmd),
            Err(OrderError::NegativeAmount {
                field: "shipping_fee",
                ..
            })
        ));
    }

    #[test]
    fn test_total_includes_fee() {
        let order = order_with_item();
        assert_eq!(order.subtotal(), Money::new(58000));
        assert_eq!(order.total_amount(), Money::new(61000));
    }

    #[test]
    fn test_total_is_not_clamped() {
        let mut order = create_order(0, 5000);
        order
            .execute(|o| o.add_item(AddItem::new(ProductId::new(), "Pen", Money::new(1000), 1)))
            .unwrap();
        assert_eq!(order.total_amount(), Money::new(-4000));
    }

    #[test]
    fn test_total_matches_formula_after_every_add() {
        let mut order = create_order(2500, 1000);
        let lines = [(1200, 3), (0, 1), (99_999, 2), (5, 7)];
        for (price, qty) in lines {
            order
                .execute(|o| o.add_item(AddItem::new(ProductId::new(), "x", Money::new(price), qty)))
                .unwrap();
            let expected: Money = order.items().iter().map(|i| i.subtotal()).sum::<Money>()
                + Money::new(2500)
                - Money::new(1000);
            assert_eq!(order.total_amount(), expected);
        }
    }

    #[test]
    fn test_validate_for_placement_requires_items() {
        assert!(matches!(
            create_order(0, 0).validate_for_placement(),
            Err(OrderError::NoItems)
        ));
        assert!(order_with_item().validate_for_placement().is_ok());
    }

    #[test]
    fn test_add_item_after_payment_fails() {
        let order = order_in(OrderStatus::Paid);
        let result = order.add_item(AddItem::new(ProductId::new(), "Hat", Money::new(1000), 1));
        assert!(matches!(result, Err(OrderError::ItemsLocked { .. })));
    }

    #[test]
    fn test_add_item_rejects_subtotal_overflow() {
        let mut order = create_order(0, 0);
        order
            .execute(|o| o.add_item(AddItem::new(ProductId::new(), "Bar", Money::new(i64::MAX), 1)))
            .unwrap();

        let result = order.add_item(AddItem::new(ProductId::new(), "Bar", Money::new(i64::MAX), 1));
        assert!(matches!(result, Err(OrderError::AmountOverflow)));
        assert_eq!(order.item_count(), 1);
        assert_eq!(order.total_amount(), Money::new(i64::MAX));
    }

    #[test]
    fn test_add_item_rejects_overflow_with_shipping_fee() {
        let order = create_order(1, 0);
        let result = order.add_item(AddItem::new(ProductId::new(), "Bar", Money::new(i64::MAX), 1));
        assert!(matches!(result, Err(OrderError::AmountOverflow)));
    }

    #[test]
    fn test_only_table_transitions_succeed() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                if to == OrderStatus::Cancelled || to == OrderStatus::PendingPayment {
                    continue;
                }
                let mut order = order_in(from);
                let result = order.execute(|o| o.transition(to));
                if from.can_transition_to(to) {
                    assert!(result.is_ok(), "{from} -> {to} should succeed");
                    assert_eq!(order.status(), to);
                } else {
                    assert!(
                        matches!(result, Err(OrderError::InvalidTransition { .. })),
                        "{from} -> {to} should fail"
                    );
                    assert_eq!(order.status(), from);
                }
            }
        }
    }

    #[test]
    fn test_mark_as_paid_from_shipped_names_both_statuses() {
        let order = order_in(OrderStatus::Shipped);
        let err = order
            .mark_as_paid(PaymentMethod::CreditCard, "PAY-1")
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot transition from SHIPPED to PAID");
    }

    #[test]
    fn test_mark_as_paid_records_payment() {
        let order = order_in(OrderStatus::Paid);
        assert_eq!(order.payment_method(), Some(PaymentMethod::CreditCard));
        assert_eq!(order.payment_transaction_id(), Some("PAY-TEST"));
        assert!(order.paid_at().is_some());
    }

    #[test]
    fn test_ship_requires_tracking_number() {
        let order = order_in(OrderStatus::Preparing);
        assert!(matches!(
            order.ship("   "),
            Err(OrderError::TrackingNumberRequired)
        ));
    }

    #[test]
    fn test_ship_and_deliver_cascade_to_items() {
        let mut order = order_in(OrderStatus::Preparing);
        order.execute(|o| o.ship("TRK-9")).unwrap();
        assert!(order
            .items()
            .iter()
            .all(|i| i.status() == OrderItemStatus::Shipped));
        assert_eq!(order.tracking_number(), Some("TRK-9"));

        order.execute(|o| o.deliver()).unwrap();
        assert!(order
            .items()
            .iter()
            .all(|i| i.status() == OrderItemStatus::Delivered));
        assert!(order.delivered_at().is_some());
    }

    #[test]
    fn test_cascade_skips_cancelled_items() {
        let mut order = order_with_item();
        order
            .execute(|o| o.add_item(AddItem::new(ProductId::new(), "Cap", Money::new(9000), 1)))
            .unwrap();
        let cancelled_id = order.items()[1].id();
        order
            .execute(|o| o.cancel_item(cancelled_id, "out of stock"))
            .unwrap();

        for step in [OrderStatus::Paid, OrderStatus::Preparing, OrderStatus::Shipped] {
            order.execute(|o| o.transition(step)).unwrap();
        }

        assert_eq!(order.items()[0].status(), OrderItemStatus::Shipped);
        assert_eq!(order.items()[1].status(), OrderItemStatus::Cancelled);
    }

    #[test]
    fn test_cancel_from_cancellable_states() {
        for status in [
            OrderStatus::PendingPayment,
            OrderStatus::Paid,
            OrderStatus::Preparing,
        ] {
            let mut order = order_in(status);
            order.execute(|o| o.cancel("customer request")).unwrap();
            assert_eq!(order.status(), OrderStatus::Cancelled);
            assert_eq!(order.cancel_reason(), Some("customer request"));
            assert!(order.items().iter().all(|i| i.is_cancelled()));
        }
    }

    #[test]
    fn test_cancel_after_shipping_fails() {
        for status in [
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let order = order_in(status);
            assert!(matches!(
                order.cancel("too late"),
                Err(OrderError::CannotCancel { .. })
            ));
        }
    }

    #[test]
    fn test_cancel_item_twice_fails() {
        let mut order = order_with_item();
        let item_id = order.items()[0].id();
        order.execute(|o| o.cancel_item(item_id, "first")).unwrap();

        let result = order.cancel_item(item_id, "second");
        assert!(matches!(
            result,
            Err(OrderError::ItemNotCancellable {
                status: OrderItemStatus::Cancelled,
                ..
            })
        ));
        assert_eq!(order.status(), OrderStatus::PendingPayment);
    }

    #[test]
    fn test_cancel_unknown_item_fails() {
        let order = order_with_item();
        let result = order.cancel_item(OrderItemId::new(), "nope");
        assert!(matches!(result, Err(OrderError::ItemNotFound { .. })));
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let order = order_in(OrderStatus::Paid);
        let json = serde_json::to_value(&order).unwrap();
        let restored: Order = serde_json::from_value(json).unwrap();
        assert_eq!(restored.id(), order.id());
        assert_eq!(restored.status(), OrderStatus::Paid);
        assert_eq!(restored.total_amount(), order.total_amount());
    }
}
