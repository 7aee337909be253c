//! Integration tests for the order, payment and coupon workflows.

use chrono::{Duration, Utc};
use common::{MemberId, ProductId};
use domain::{
    AddItem, CouponType, CreateCoupon, ErrorKind, Money, OrderError, OrderStatus, PaymentError,
    PaymentMethod, PaymentStatus, ShippingAddress,
};
use store::InMemoryStore;
use workflow::{
    CouponService, CreateOrderRequest, InMemoryInventory, InMemoryNotifier, InventoryError,
    MockPaymentGateway, Notification, OrderWorkflowService, PaymentWorkflowService, Requester,
    WorkflowError,
};

type TestOrders = OrderWorkflowService<InMemoryStore, InMemoryInventory, InMemoryNotifier>;
type TestPayments = PaymentWorkflowService<InMemoryStore, MockPaymentGateway, InMemoryNotifier>;

struct TestHarness {
    orders: TestOrders,
    payments: TestPayments,
    coupons: CouponService<InMemoryStore>,
    inventory: InMemoryInventory,
    gateway: MockPaymentGateway,
    notifier: InMemoryNotifier,
    member: MemberId,
    keyboard: ProductId,
    mouse: ProductId,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let inventory = InMemoryInventory::new();
        let gateway = MockPaymentGateway::new();
        let notifier = InMemoryNotifier::new();

        let keyboard = ProductId::new();
        let mouse = ProductId::new();
        inventory.set_stock(keyboard, None, 10);
        inventory.set_stock(mouse, None, 10);

        Self {
            orders: OrderWorkflowService::new(store.clone(), inventory.clone(), notifier.clone()),
            payments: PaymentWorkflowService::new(store.clone(), gateway.clone(), notifier.clone()),
            coupons: CouponService::new(store),
            inventory,
            gateway,
            notifier,
            member: MemberId::new(),
            keyboard,
            mouse,
        }
    }

    fn owner(&self) -> Requester {
        Requester::member(self.member)
    }

    fn request(&self, items: Vec<AddItem>) -> CreateOrderRequest {
        CreateOrderRequest {
            shipping_address: ShippingAddress::new(
                "Hong Gildong",
                "010-1234-5678",
                "06234",
                "Teheran-ro 123, Gangnam-gu",
                Some("4F".to_string()),
            ),
            items,
            shipping_fee: Some(Money::new(3000)),
            discount_amount: None,
            member_coupon_id: None,
        }
    }

    /// Two keyboards at 25000 and one mouse at 8000, plus 3000 shipping.
    fn standard_request(&self) -> CreateOrderRequest {
        self.request(vec![
            AddItem::new(self.keyboard, "Mechanical keyboard", Money::new(25000), 2),
            AddItem::new(self.mouse, "Wireless mouse", Money::new(8000), 1),
        ])
    }

    async fn place_standard_order(&self) -> domain::Order {
        self.orders
            .create_order(self.member, self.standard_request())
            .await
            .unwrap()
    }

    async fn paid_order(&self) -> domain::Order {
        let order = self.place_standard_order().await;
        let payment = self
            .payments
            .request_payment(order.id(), PaymentMethod::CreditCard, self.owner())
            .await
            .unwrap();
        self.payments
            .confirm_payment(payment.transaction_id(), payment.amount())
            .await
            .unwrap();
        self.orders.get_order(order.id(), self.owner()).await.unwrap()
    }

    fn stock(&self, product: ProductId) -> u32 {
        self.inventory.stock_of(product, None).unwrap()
    }
}

fn fixed_coupon(code: &str, value: i64) -> CreateCoupon {
    let now = Utc::now();
    CreateCoupon {
        code: code.to_string(),
        name: "Welcome discount".to_string(),
        coupon_type: CouponType::FixedAmount,
        discount_value: value,
        minimum_order: Some(Money::new(30000)),
        maximum_discount: None,
        valid_from: now - Duration::days(1),
        valid_to: now + Duration::days(30),
        total_quantity: 100,
    }
}

#[tokio::test]
async fn test_order_totals_and_stock_reservation() {
    let h = TestHarness::new();
    let order = h.place_standard_order().await;

    assert_eq!(order.status(), OrderStatus::PendingPayment);
    assert_eq!(order.subtotal(), Money::new(58000));
    assert_eq!(order.total_amount(), Money::new(61000));
    assert_eq!(order.item_count(), 2);
    assert!(order.order_number().starts_with("ORD-"));

    assert_eq!(h.stock(h.keyboard), 8);
    assert_eq!(h.stock(h.mouse), 9);

    let by_number = h
        .orders
        .get_order_by_number(order.order_number(), h.owner())
        .await
        .unwrap();
    assert_eq!(by_number.id(), order.id());
}

#[tokio::test]
async fn test_insufficient_stock_releases_earlier_lines() {
    let h = TestHarness::new();
    h.inventory.set_stock(h.mouse, None, 0);

    let err = h
        .orders
        .create_order(h.member, h.standard_request())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Inventory(InventoryError::InsufficientStock { .. })
    ));
    assert_eq!(h.stock(h.keyboard), 10);
    assert_eq!(h.stock(h.mouse), 0);
    assert_eq!(h.inventory.increases().len(), 1);
}

#[tokio::test]
async fn test_cancel_restores_stock_once_per_item() {
    let h = TestHarness::new();
    let order = h.place_standard_order().await;

    let cancelled = h
        .orders
        .cancel_order(order.id(), h.member, "Changed my mind")
        .await
        .unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason(), Some("Changed my mind"));
    assert!(cancelled.cancelled_at().is_some());

    assert_eq!(h.stock(h.keyboard), 10);
    assert_eq!(h.stock(h.mouse), 10);
    assert_eq!(h.inventory.increases().len(), 2);

    let err = h
        .orders
        .cancel_order(order.id(), h.member, "again")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(h.inventory.increases().len(), 2);
}

#[tokio::test]
async fn test_cancelled_item_is_not_restored_again_on_order_cancel() {
    let h = TestHarness::new();
    let order = h.place_standard_order().await;
    let keyboard_line = order.items()[0].id();

    h.orders
        .cancel_order_item(order.id(), h.member, keyboard_line, "Only need the mouse")
        .await
        .unwrap();
    assert_eq!(h.stock(h.keyboard), 10);

    h.orders
        .cancel_order(order.id(), h.member, "Never mind")
        .await
        .unwrap();

    assert_eq!(h.stock(h.keyboard), 10);
    assert_eq!(h.stock(h.mouse), 10);
    assert_eq!(h.inventory.increases().len(), 2);
}

#[tokio::test]
async fn test_full_lifecycle_with_shipping_notification() {
    let h = TestHarness::new();
    let order = h.paid_order().await;
    assert_eq!(order.status(), OrderStatus::Paid);
    assert_eq!(order.payment_method(), Some(PaymentMethod::CreditCard));

    h.orders.start_preparing(order.id()).await.unwrap();
    let shipped = h.orders.ship_order(order.id(), "TRACK-0001").await.unwrap();
    assert_eq!(shipped.tracking_number(), Some("TRACK-0001"));
    let delivered = h.orders.deliver_order(order.id()).await.unwrap();
    assert_eq!(delivered.status(), OrderStatus::Delivered);
    assert!(delivered.delivered_at().is_some());

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(matches!(sent[0], Notification::PaymentCompleted { amount, .. } if amount == Money::new(61000)));
    assert!(matches!(
        &sent[1],
        Notification::OrderShipped { tracking_number, .. } if tracking_number == "TRACK-0001"
    ));

    let history = h
        .orders
        .get_order_history(order.id(), h.owner())
        .await
        .unwrap();
    let types: Vec<&str> = history.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types.first(), Some(&"OrderCreated"));
    assert_eq!(types.last(), Some(&"OrderDelivered"));
}

#[tokio::test]
async fn test_mark_as_paid_from_shipped_fails() {
    let h = TestHarness::new();
    let order = h.paid_order().await;
    h.orders.start_preparing(order.id()).await.unwrap();
    h.orders.ship_order(order.id(), "TRACK-0002").await.unwrap();

    let err = h
        .orders
        .process_payment(order.id(), PaymentMethod::BankTransfer, "TX-LATE")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Order(OrderError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Paid,
        })
    ));
    assert_eq!(err.to_string(), "Cannot transition from SHIPPED to PAID");
}

#[tokio::test]
async fn test_shipped_order_cannot_be_cancelled() {
    let h = TestHarness::new();
    let order = h.paid_order().await;
    h.orders.start_preparing(order.id()).await.unwrap();
    h.orders.ship_order(order.id(), "TRACK-0003").await.unwrap();

    let err = h
        .orders
        .cancel_order(order.id(), h.member, "too late")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(h.stock(h.keyboard), 8);
}

#[tokio::test]
async fn test_request_payment_for_paid_order_fails() {
    let h = TestHarness::new();
    let order = h.paid_order().await;

    let err = h
        .payments
        .request_payment(order.id(), PaymentMethod::CreditCard, h.owner())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::OrderNotPayable {
            status: OrderStatus::Paid
        }
    ));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_card_decline_leaves_order_pending() {
    let h = TestHarness::new();
    // 6999 + 3000 shipping ends in 9999, which the mock gateway declines.
    let order = h
        .orders
        .create_order(
            h.member,
            h.request(vec![AddItem::new(h.mouse, "Gaming mouse", Money::new(6999), 1)]),
        )
        .await
        .unwrap();
    assert_eq!(order.total_amount(), Money::new(9999));

    let payment = h
        .payments
        .request_payment(order.id(), PaymentMethod::CreditCard, h.owner())
        .await
        .unwrap();
    let failed = h
        .payments
        .confirm_payment(payment.transaction_id(), payment.amount())
        .await
        .unwrap();

    assert_eq!(failed.status(), PaymentStatus::Failed);
    assert_eq!(
        failed.fail_reason(),
        Some("Simulated payment failure: Card declined")
    );
    let order = h.orders.get_order(order.id(), h.owner()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::PendingPayment);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_second_confirmation_is_rejected() {
    let h = TestHarness::new();
    let order = h.place_standard_order().await;
    let payment = h
        .payments
        .request_payment(order.id(), PaymentMethod::CreditCard, h.owner())
        .await
        .unwrap();

    let completed = h
        .payments
        .confirm_payment(payment.transaction_id(), payment.amount())
        .await
        .unwrap();
    assert_eq!(completed.status(), PaymentStatus::Completed);
    assert!(completed.pg_transaction_id().unwrap().starts_with("PG-"));

    let err = h
        .payments
        .confirm_payment(payment.transaction_id(), payment.amount())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Payment(PaymentError::AlreadyProcessed { .. })
    ));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(h.gateway.confirmations().len(), 1);
}

#[tokio::test]
async fn test_amount_mismatch_never_reaches_gateway() {
    let h = TestHarness::new();
    let order = h.place_standard_order().await;
    let payment = h
        .payments
        .request_payment(order.id(), PaymentMethod::CreditCard, h.owner())
        .await
        .unwrap();

    let err = h
        .payments
        .confirm_payment(payment.transaction_id(), Money::new(1000))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Payment(PaymentError::AmountMismatch { .. })
    ));
    assert!(h.gateway.confirmations().is_empty());
}

#[tokio::test]
async fn test_gateway_outage_fails_payment() {
    let h = TestHarness::new();
    let order = h.place_standard_order().await;
    let payment = h
        .payments
        .request_payment(order.id(), PaymentMethod::CreditCard, h.owner())
        .await
        .unwrap();

    h.gateway.set_unavailable(true);
    let failed = h
        .payments
        .confirm_payment(payment.transaction_id(), payment.amount())
        .await
        .unwrap();

    assert_eq!(failed.status(), PaymentStatus::Failed);
    assert!(failed.fail_reason().is_some());
    let order = h.orders.get_order(order.id(), h.owner()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::PendingPayment);
}

#[tokio::test]
async fn test_settlement_failure_refunds_charge() {
    let h = TestHarness::new();
    let order = h.place_standard_order().await;
    let payment = h
        .payments
        .request_payment(order.id(), PaymentMethod::CreditCard, h.owner())
        .await
        .unwrap();

    // The order is cancelled while the payment is in flight.
    h.orders
        .cancel_order(order.id(), h.member, "Cancelled elsewhere")
        .await
        .unwrap();

    let err = h
        .payments
        .confirm_payment(payment.transaction_id(), payment.amount())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Order(OrderError::InvalidTransition { .. })
    ));

    let refunded = h.payments.get_payment(payment.id(), h.owner()).await.unwrap();
    assert_eq!(refunded.status(), PaymentStatus::Cancelled);
    assert!(refunded.cancelled_at().is_some());
    assert_eq!(h.gateway.cancellations().len(), 1);

    let order = h.orders.get_order(order.id(), h.owner()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_settlement_failure_with_declined_refund_fails_payment() {
    let h = TestHarness::new();
    let order = h.place_standard_order().await;
    let payment = h
        .payments
        .request_payment(order.id(), PaymentMethod::CreditCard, h.owner())
        .await
        .unwrap();

    h.orders
        .cancel_order(order.id(), h.member, "Cancelled elsewhere")
        .await
        .unwrap();
    h.gateway.set_fail_on_cancel(true);

    assert!(
        h.payments
            .confirm_payment(payment.transaction_id(), payment.amount())
            .await
            .is_err()
    );

    let failed = h.payments.get_payment(payment.id(), h.owner()).await.unwrap();
    assert_eq!(failed.status(), PaymentStatus::Failed);
    assert!(failed.fail_reason().unwrap().contains("PG-"));
}

#[tokio::test]
async fn test_cancel_completed_payment() {
    let h = TestHarness::new();
    let order = h.paid_order().await;
    let payment = h
        .payments
        .get_payments_by_order(order.id(), h.owner())
        .await
        .unwrap()
        .remove(0);

    let cancelled = h
        .payments
        .cancel_payment(payment.id(), h.owner())
        .await
        .unwrap();
    assert_eq!(cancelled.status(), PaymentStatus::Cancelled);
    assert_eq!(
        h.gateway.cancellations()[0].0,
        payment.pg_transaction_id().unwrap()
    );

    let err = h
        .payments
        .cancel_payment(payment.id(), h.owner())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Payment(PaymentError::NotCancellable { .. })
    ));
}

#[tokio::test]
async fn test_cancel_payment_with_gateway_down_keeps_payment() {
    let h = TestHarness::new();
    let order = h.paid_order().await;
    let payment = h
        .payments
        .get_payments_by_order(order.id(), h.owner())
        .await
        .unwrap()
        .remove(0);

    h.gateway.set_unavailable(true);
    let err = h
        .payments
        .cancel_payment(payment.id(), h.owner())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);

    let unchanged = h.payments.get_payment(payment.id(), h.owner()).await.unwrap();
    assert_eq!(unchanged.status(), PaymentStatus::Completed);
}

#[tokio::test]
async fn test_coupon_is_redeemed_and_restored_on_cancel() {
    let h = TestHarness::new();
    let coupon = h.coupons.create_coupon(fixed_coupon("WELCOME5", 5000)).await.unwrap();
    let issued = h.coupons.issue_coupon(coupon.id(), h.member).await.unwrap();

    let mut request = h.standard_request();
    request.member_coupon_id = Some(issued.id());
    let order = h.orders.create_order(h.member, request).await.unwrap();

    assert_eq!(order.discount_amount(), Money::new(5000));
    assert_eq!(order.total_amount(), Money::new(56000));
    let used = h.coupons.get_member_coupons(h.member, false).await.unwrap();
    assert!(used[0].member_coupon.is_used());
    assert_eq!(used[0].member_coupon.order_id(), Some(order.id()));
    assert_eq!(h.coupons.get_coupon(coupon.id()).await.unwrap().used_quantity(), 1);

    h.orders
        .cancel_order(order.id(), h.member, "Found it cheaper")
        .await
        .unwrap();

    let restored = h.coupons.get_member_coupons(h.member, true).await.unwrap();
    assert_eq!(restored.len(), 1);
    assert!(!restored[0].member_coupon.is_used());
    assert_eq!(h.coupons.get_coupon(coupon.id()).await.unwrap().used_quantity(), 0);
}

#[tokio::test]
async fn test_used_coupon_cannot_be_applied_twice() {
    let h = TestHarness::new();
    let coupon = h.coupons.create_coupon(fixed_coupon("ONCE", 2000)).await.unwrap();
    let issued = h.coupons.issue_coupon(coupon.id(), h.member).await.unwrap();

    let mut request = h.standard_request();
    request.member_coupon_id = Some(issued.id());
    h.orders.create_order(h.member, request.clone()).await.unwrap();

    let err = h.orders.create_order(h.member, request).await.unwrap_err();
    assert_eq!(err.to_string(), "Coupon already used");
    // Stock was only taken for the first order.
    assert_eq!(h.stock(h.keyboard), 8);
}

#[tokio::test]
async fn test_someone_elses_coupon_is_forbidden() {
    let h = TestHarness::new();
    let coupon = h.coupons.create_coupon(fixed_coupon("MINE", 2000)).await.unwrap();
    let issued = h.coupons.issue_coupon(coupon.id(), MemberId::new()).await.unwrap();

    let mut request = h.standard_request();
    request.member_coupon_id = Some(issued.id());
    let err = h.orders.create_order(h.member, request).await.unwrap_err();

    assert!(err.is_forbidden());
    assert_eq!(h.stock(h.keyboard), 10);
}

#[tokio::test]
async fn test_ownership_is_enforced() {
    let h = TestHarness::new();
    let order = h.place_standard_order().await;
    let stranger = MemberId::new();

    let err = h
        .orders
        .get_order(order.id(), Requester::member(stranger))
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
    assert_eq!(err.to_string(), "Not authorized to access this order");

    let as_admin = h
        .orders
        .get_order(order.id(), Requester::admin(stranger))
        .await
        .unwrap();
    assert_eq!(as_admin.id(), order.id());

    let err = h
        .orders
        .cancel_order(order.id(), stranger, "not mine")
        .await
        .unwrap_err();
    assert!(err.is_forbidden());

    let err = h
        .payments
        .request_payment(order.id(), PaymentMethod::CreditCard, Requester::member(stranger))
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn test_failed_notification_does_not_fail_shipping() {
    let h = TestHarness::new();
    let order = h.paid_order().await;
    h.orders.start_preparing(order.id()).await.unwrap();

    h.notifier.set_fail(true);
    let shipped = h.orders.ship_order(order.id(), "TRACK-0004").await.unwrap();
    assert_eq!(shipped.status(), OrderStatus::Shipped);
}

#[tokio::test]
async fn test_my_orders_are_paged_newest_first() {
    let h = TestHarness::new();
    let first = h.place_standard_order().await;
    let second = h.place_standard_order().await;
    h.orders
        .create_order(MemberId::new(), h.standard_request())
        .await
        .unwrap();

    let page = h
        .orders
        .get_my_orders(h.member, common::PageRequest::new(0, 1).unwrap())
        .await
        .unwrap();
    assert_eq!(page.total_elements, 2);
    assert_eq!(page.content.len(), 1);
    assert_eq!(page.content[0].id(), second.id());
    assert_ne!(page.content[0].id(), first.id());
}
