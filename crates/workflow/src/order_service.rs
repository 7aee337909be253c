//! Order workflow: placement with stock reservation, status transitions and
//! cancellation with compensation.

use chrono::Utc;
use common::{MemberCouponId, MemberId, OrderId, OrderItemId, Page, PageRequest};
use domain::{
    AddItem, Aggregate, CouponError, CreateOrder, Money, Order, OrderError, OrderEvent, OrderItem,
    OrderSearchCondition, PaymentMethod, ShippingAddress,
};
use serde::{Deserialize, Serialize};
use store::{EventEnvelope, Store};

use crate::coupon_service::CouponService;
use crate::error::{Result, WorkflowError};
use crate::requester::Requester;
use crate::services::{InventoryAdjuster, Notification, Notifier};

const NOT_AUTHORIZED: &str = "Not authorized to access this order";

/// Everything needed to place an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_address: ShippingAddress,
    pub items: Vec<AddItem>,
    #[serde(default)]
    pub shipping_fee: Option<Money>,
    /// Ignored when a member coupon is given; the coupon decides the discount.
    #[serde(default)]
    pub discount_amount: Option<Money>,
    #[serde(default)]
    pub member_coupon_id: Option<MemberCouponId>,
}

/// Orchestrates the order lifecycle across the store, inventory and coupons.
pub struct OrderWorkflowService<S, I, N>
where
    S: Store,
    I: InventoryAdjuster,
    N: Notifier,
{
    store: S,
    coupons: CouponService<S>,
    inventory: I,
    notifier: N,
}

impl<S, I, N> OrderWorkflowService<S, I, N>
where
    S: Store,
    I: InventoryAdjuster,
    N: Notifier,
{
    pub fn new(store: S, inventory: I, notifier: N) -> Self {
        let coupons = CouponService::new(store.clone());
        Self {
            store,
            coupons,
            inventory,
            notifier,
        }
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| WorkflowError::OrderNotFound(order_id.to_string()))
    }

    async fn load_owned(&self, order_id: OrderId, member_id: MemberId) -> Result<Order> {
        let order = self.load(order_id).await?;
        if !order.is_owned_by(member_id) {
            return Err(WorkflowError::Forbidden(NOT_AUTHORIZED));
        }
        Ok(order)
    }

    async fn save(&self, order: &mut Order, events: &[OrderEvent]) -> Result<()> {
        let version = self.store.save_order(order, events).await?;
        order.set_version(version);
        Ok(())
    }

    /// Places an order: prices it, reserves stock, redeems the coupon and saves.
    ///
    /// Nothing is touched until every line has been validated. If a later
    /// step fails the earlier ones are undone in reverse order.
    #[tracing::instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(&self, member_id: MemberId, request: CreateOrderRequest) -> Result<Order> {
        let started = std::time::Instant::now();

        let mut cmd = CreateOrder::new(member_id, request.shipping_address);
        cmd.shipping_fee = request.shipping_fee;
        cmd.discount_amount = request.discount_amount;

        let mut subtotal = Money::zero();
        for line in &request.items {
            line.to_item()?;
            subtotal = subtotal
                .checked_add(line.subtotal()?)
                .ok_or(OrderError::AmountOverflow)?;
        }

        if let Some(member_coupon_id) = request.member_coupon_id {
            let discount = self
                .price_member_coupon(member_coupon_id, member_id, subtotal)
                .await?;
            cmd = cmd.with_member_coupon(member_coupon_id, discount);
        }

        let (mut order, mut events) = Order::create(cmd)?;
        for line in request.items {
            events.extend(order.execute(|o| o.add_item(line))?);
        }
        order.validate_for_placement()?;

        let payable = order.subtotal() + order.shipping_fee();
        if order.discount_amount() > payable {
            return Err(WorkflowError::DiscountExceedsAmount {
                discount: order.discount_amount(),
                amount: payable,
            });
        }

        let mut reserved: Vec<OrderItem> = Vec::with_capacity(order.item_count());
        for item in order.items() {
            if let Err(e) = self
                .inventory
                .decrease_stock(item.product_id(), item.product_option_id(), item.quantity())
                .await
            {
                self.release_stock(&reserved).await;
                return Err(e.into());
            }
            reserved.push(item.clone());
        }

        if let Some(member_coupon_id) = order.member_coupon_id()
            && let Err(e) = self.coupons.use_coupon(member_coupon_id, order.id()).await
        {
            self.release_stock(&reserved).await;
            return Err(e);
        }

        if let Err(e) = self.save(&mut order, &events).await {
            if let Some(member_coupon_id) = order.member_coupon_id() {
                self.restore_coupon_best_effort(member_coupon_id).await;
            }
            self.release_stock(&reserved).await;
            return Err(e);
        }

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_creation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id(),
            order_number = order.order_number(),
            total = %order.total_amount(),
            "order created"
        );
        Ok(order)
    }

    /// Discount the member coupon gives on `subtotal`, after checking it can be used.
    async fn price_member_coupon(
        &self,
        member_coupon_id: MemberCouponId,
        member_id: MemberId,
        subtotal: Money,
    ) -> Result<Money> {
        let (member_coupon, coupon) = self.coupons.load_member_coupon(member_coupon_id).await?;
        if !member_coupon.is_owned_by(member_id) {
            return Err(WorkflowError::Forbidden("Not authorized to use this coupon"));
        }
        if member_coupon.is_used() {
            return Err(CouponError::AlreadyUsed.into());
        }

        let now = Utc::now();
        if !coupon.is_applicable_at(subtotal, now) {
            return Err(CouponError::NotApplicable.into());
        }
        Ok(coupon.calculate_discount(subtotal))
    }

    /// Compensation for a failed placement. Failures here are logged only.
    async fn release_stock(&self, items: &[OrderItem]) {
        for item in items.iter().rev() {
            metrics::counter!("stock_compensations_total").increment(1);
            if let Err(e) = self
                .inventory
                .increase_stock(item.product_id(), item.product_option_id(), item.quantity())
                .await
            {
                metrics::counter!("stock_restore_failures_total").increment(1);
                tracing::error!(
                    product_id = %item.product_id(),
                    quantity = item.quantity(),
                    error = %e,
                    "failed to release reserved stock"
                );
            }
        }
    }

    /// Puts back stock held by cancelled lines. Failures are logged only.
    async fn restore_stock(&self, order_id: OrderId, items: &[OrderItem]) {
        for item in items {
            if let Err(e) = self
                .inventory
                .increase_stock(item.product_id(), item.product_option_id(), item.quantity())
                .await
            {
                metrics::counter!("stock_restore_failures_total").increment(1);
                tracing::warn!(
                    %order_id,
                    item_id = %item.id(),
                    quantity = item.quantity(),
                    error = %e,
                    "stock restoration failed"
                );
            }
        }
    }

    async fn restore_coupon_best_effort(&self, member_coupon_id: MemberCouponId) {
        if let Err(e) = self.coupons.restore_coupon(member_coupon_id).await {
            tracing::warn!(%member_coupon_id, error = %e, "coupon restoration failed");
        }
    }

    pub async fn get_order(&self, order_id: OrderId, requester: Requester) -> Result<Order> {
        let order = self.load(order_id).await?;
        if !requester.can_access(order.member_id()) {
            return Err(WorkflowError::Forbidden(NOT_AUTHORIZED));
        }
        Ok(order)
    }

    pub async fn get_order_by_number(&self, order_number: &str, requester: Requester) -> Result<Order> {
        let order = self
            .store
            .find_order_by_number(order_number)
            .await?
            .ok_or_else(|| WorkflowError::OrderNotFound(order_number.to_string()))?;
        if !requester.can_access(order.member_id()) {
            return Err(WorkflowError::Forbidden(NOT_AUTHORIZED));
        }
        Ok(order)
    }

    /// The order's domain events, oldest first.
    pub async fn get_order_history(
        &self,
        order_id: OrderId,
        requester: Requester,
    ) -> Result<Vec<EventEnvelope>> {
        let order = self.get_order(order_id, requester).await?;
        Ok(self.store.events_for_aggregate(order.aggregate_id()).await?)
    }

    pub async fn get_my_orders(&self, member_id: MemberId, page: PageRequest) -> Result<Page<Order>> {
        self.search_orders(&OrderSearchCondition::for_member(member_id), page)
            .await
    }

    pub async fn search_orders(
        &self,
        condition: &OrderSearchCondition,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        condition.validate()?;
        Ok(self.store.search_orders(condition, page).await?)
    }

    async fn transition<F>(&self, order_id: OrderId, command: F) -> Result<Order>
    where
        F: FnOnce(&Order) -> std::result::Result<Vec<OrderEvent>, OrderError>,
    {
        let mut order = self.load(order_id).await?;
        let from = order.status();
        let events = order.execute(command)?;
        self.save(&mut order, &events).await?;

        metrics::counter!("order_transitions_total", "to" => order.status().as_str()).increment(1);
        tracing::info!(%order_id, %from, to = %order.status(), "order status changed");
        Ok(order)
    }

    #[tracing::instrument(skip(self, transaction_id))]
    pub async fn process_payment(
        &self,
        order_id: OrderId,
        method: PaymentMethod,
        transaction_id: &str,
    ) -> Result<Order> {
        self.transition(order_id, |o| o.mark_as_paid(method, transaction_id))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn start_preparing(&self, order_id: OrderId) -> Result<Order> {
        self.transition(order_id, |o| o.start_preparing()).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn ship_order(&self, order_id: OrderId, tracking_number: &str) -> Result<Order> {
        let order = self.transition(order_id, |o| o.ship(tracking_number)).await?;

        let notification = Notification::OrderShipped {
            member_id: order.member_id(),
            order_id,
            order_number: order.order_number().to_string(),
            tracking_number: order.tracking_number().unwrap_or_default().to_string(),
        };
        if let Err(e) = self.notifier.notify(notification).await {
            metrics::counter!("notifications_failed_total").increment(1);
            tracing::warn!(%order_id, error = %e, "shipping notification failed");
        }
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn deliver_order(&self, order_id: OrderId) -> Result<Order> {
        self.transition(order_id, |o| o.deliver()).await
    }

    /// Cancels the whole order, then gives back stock and the coupon.
    ///
    /// The cancel is committed first; stock and coupon restoration are best
    /// effort afterwards.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_order(&self, order_id: OrderId, member_id: MemberId, reason: &str) -> Result<Order> {
        let mut order = self.load_owned(order_id, member_id).await?;
        let held: Vec<OrderItem> = order.active_items().cloned().collect();

        let events = order.execute(|o| o.cancel(reason))?;
        self.save(&mut order, &events).await?;

        self.restore_stock(order_id, &held).await;
        if let Some(member_coupon_id) = order.member_coupon_id() {
            self.restore_coupon_best_effort(member_coupon_id).await;
        }

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, reason, restored_items = held.len(), "order cancelled");
        Ok(order)
    }

    /// Cancels one line and gives back its stock. The order status is left alone.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_order_item(
        &self,
        order_id: OrderId,
        member_id: MemberId,
        item_id: OrderItemId,
        reason: &str,
    ) -> Result<Order> {
        let mut order = self.load_owned(order_id, member_id).await?;

        let events = order.execute(|o| o.cancel_item(item_id, reason))?;
        let item = order
            .item(item_id)
            .cloned()
            .ok_or(OrderError::ItemNotFound { item_id })?;
        self.save(&mut order, &events).await?;

        self.restore_stock(order_id, std::slice::from_ref(&item)).await;

        metrics::counter!("order_items_cancelled_total").increment(1);
        tracing::info!(%order_id, %item_id, "order item cancelled");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;
    use domain::OrderStatus;
    use store::InMemoryStore;

    use crate::services::{InMemoryInventory, InMemoryNotifier};

    fn service() -> (
        OrderWorkflowService<InMemoryStore, InMemoryInventory, InMemoryNotifier>,
        InMemoryInventory,
    ) {
        let inventory = InMemoryInventory::new();
        let service =
            OrderWorkflowService::new(InMemoryStore::new(), inventory.clone(), InMemoryNotifier::new());
        (service, inventory)
    }

    fn request(items: Vec<AddItem>) -> CreateOrderRequest {
        CreateOrderRequest {
            shipping_address: ShippingAddress::new("Kang", "010-7777-8888", "21999", "Songdo 3", None),
            items,
            shipping_fee: Some(Money::new(3000)),
            discount_amount: None,
            member_coupon_id: None,
        }
    }

    #[tokio::test]
    async fn invalid_line_touches_no_stock() {
        let (service, inventory) = service();
        let product = ProductId::new();
        inventory.set_stock(product, None, 5);

        let items = vec![
            AddItem::new(product, "Pen", Money::new(1000), 1),
            AddItem::new(ProductId::new(), "Broken", Money::new(1000), 0),
        ];
        let err = service
            .create_order(MemberId::new(), request(items))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Order(OrderError::InvalidQuantity)));
        assert!(inventory.adjustments().is_empty());
    }

    #[tokio::test]
    async fn empty_order_is_rejected() {
        let (service, _) = service();
        let err = service
            .create_order(MemberId::new(), request(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Order(OrderError::NoItems)));
    }

    #[tokio::test]
    async fn discount_larger_than_order_is_rejected() {
        let (service, inventory) = service();
        let product = ProductId::new();
        inventory.set_stock(product, None, 5);

        let mut request = request(vec![AddItem::new(product, "Pen", Money::new(1000), 1)]);
        request.discount_amount = Some(Money::new(10000));
        let err = service.create_order(MemberId::new(), request).await.unwrap_err();

        assert!(matches!(err, WorkflowError::DiscountExceedsAmount { .. }));
        assert_eq!(inventory.stock_of(product, None), Some(5));
    }

    #[tokio::test]
    async fn oversized_line_total_is_rejected_before_stock() {
        let (service, inventory) = service();
        let product = ProductId::new();
        inventory.set_stock(product, None, 5);

        let items = vec![AddItem::new(product, "Gold bar", Money::new(i64::MAX / 2 + 1), 2)];
        let err = service
            .create_order(MemberId::new(), request(items))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Order(OrderError::AmountOverflow)));
        assert_eq!(err.kind(), domain::ErrorKind::Validation);
        assert!(inventory.adjustments().is_empty());
    }

    #[tokio::test]
    async fn order_total_overflow_is_rejected_before_stock() {
        let (service, inventory) = service();
        let product = ProductId::new();
        inventory.set_stock(product, None, 5);

        let items = vec![
            AddItem::new(product, "Gold bar", Money::new(i64::MAX), 1),
            AddItem::new(product, "Gold bar", Money::new(i64::MAX), 1),
            AddItem::new(product, "Pen", Money::new(2), 1),
        ];
        let err = service
            .create_order(MemberId::new(), request(items))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Order(OrderError::AmountOverflow)));
        assert_eq!(inventory.stock_of(product, None), Some(5));
    }

    #[tokio::test]
    async fn line_total_plus_shipping_overflow_is_rejected() {
        let (service, inventory) = service();
        let product = ProductId::new();
        inventory.set_stock(product, None, 5);

        let items = vec![AddItem::new(product, "Gold bar", Money::new(i64::MAX), 1)];
        let err = service
            .create_order(MemberId::new(), request(items))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Order(OrderError::AmountOverflow)));
        assert!(inventory.adjustments().is_empty());
    }

    #[tokio::test]
    async fn item_cancel_twice_restores_once() {
        let (service, inventory) = service();
        let member = MemberId::new();
        let product = ProductId::new();
        inventory.set_stock(product, None, 5);

        let order = service
            .create_order(
                member,
                request(vec![
                    AddItem::new(product, "Pen", Money::new(1000), 2),
                    AddItem::new(product, "Pen refill", Money::new(500), 1),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(inventory.stock_of(product, None), Some(2));

        let item_id = order.items()[0].id();
        let order = service
            .cancel_order_item(order.id(), member, item_id, "too many")
            .await
            .unwrap();
        assert_eq!(order.status(), OrderStatus::PendingPayment);
        assert_eq!(inventory.stock_of(product, None), Some(4));

        let err = service
            .cancel_order_item(order.id(), member, item_id, "again")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Order(OrderError::ItemNotCancellable { .. })
        ));
        assert_eq!(inventory.stock_of(product, None), Some(4));
    }

    #[tokio::test]
    async fn search_rejects_reversed_date_range() {
        let (service, _) = service();
        let condition = OrderSearchCondition {
            start_date: Some(Utc::now()),
            end_date: Some(Utc::now() - chrono::Duration::days(1)),
            ..Default::default()
        };
        let err = service
            .search_orders(&condition, PageRequest::first())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), domain::ErrorKind::Validation);
    }
}
