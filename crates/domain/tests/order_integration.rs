//! Integration tests for the domain aggregates.
//!
//! These tests drive full lifecycles through the public API and check that
//! replaying the emitted events rebuilds the same state.

use chrono::{Duration, Utc};
use common::{MemberId, OrderId, ProductId, ProductOptionId};
use domain::{
    AddItem, Aggregate, Coupon, CouponError, CouponType, CreateCoupon, CreateOrder, DomainEvent,
    ErrorKind, MemberCoupon, Money, Order, OrderError, OrderEvent, OrderItemStatus, OrderStatus,
    Payment, PaymentError, PaymentMethod, PaymentStatus, ShippingAddress,
};

fn address() -> ShippingAddress {
    ShippingAddress::new(
        "Choi Yuna",
        "010-9876-5432",
        "48058",
        "Haeundae-ro 264",
        Some("Apt 1203".to_string()),
    )
}

/// Creates an order and records every event it emitted.
fn placed_order(lines: &[(i64, u32)], fee: i64) -> (Order, Vec<OrderEvent>) {
    let cmd = CreateOrder::new(MemberId::new(), address()).with_shipping_fee(Money::new(fee));
    let (mut order, mut history) = Order::create(cmd).unwrap();
    for (price, qty) in lines {
        let events = order
            .execute(|o| {
                o.add_item(
                    AddItem::new(ProductId::new(), "Item", Money::new(*price), *qty)
                        .with_option(ProductOptionId::new(), "Default"),
                )
            })
            .unwrap();
        history.extend(events);
    }
    (order, history)
}

mod order_lifecycle {
    use super::*;

    #[test]
    fn complete_order_lifecycle() {
        let (mut order, mut history) = placed_order(&[(29000, 2)], 3000);
        assert_eq!(order.subtotal(), Money::new(58000));
        assert_eq!(order.total_amount(), Money::new(61000));
        order.validate_for_placement().unwrap();

        history.extend(
            order
                .execute(|o| o.mark_as_paid(PaymentMethod::CreditCard, "PAY-0123456789AB"))
                .unwrap(),
        );
        history.extend(order.execute(|o| o.start_preparing()).unwrap());
        history.extend(order.execute(|o| o.ship("CJ-1234567890")).unwrap());
        history.extend(order.execute(|o| o.deliver()).unwrap());

        assert_eq!(order.status(), OrderStatus::Delivered);
        assert!(order.is_terminal());
        assert!(
            order
                .items()
                .iter()
                .all(|i| i.status() == OrderItemStatus::Delivered)
        );

        let types: Vec<_> = history.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                "OrderCreated",
                "ItemAdded",
                "OrderPaid",
                "PreparationStarted",
                "OrderShipped",
                "OrderDelivered"
            ]
        );
    }

    #[test]
    fn replaying_history_rebuilds_state() {
        let (mut order, mut history) = placed_order(&[(1000, 1), (2500, 3)], 0);
        let item_id = order.items()[0].id();
        history.extend(order.execute(|o| o.cancel_item(item_id, "changed mind")).unwrap());
        history.extend(
            order
                .execute(|o| o.mark_as_paid(PaymentMethod::BankTransfer, "PAY-1"))
                .unwrap(),
        );

        let mut rebuilt = Order::default();
        rebuilt.apply_events(history);

        assert_eq!(rebuilt.id(), order.id());
        assert_eq!(rebuilt.order_number(), order.order_number());
        assert_eq!(rebuilt.status(), OrderStatus::Paid);
        assert_eq!(rebuilt.total_amount(), order.total_amount());
        assert_eq!(rebuilt.items(), order.items());
    }

    #[test]
    fn cancellation_cascades_to_every_item() {
        let (mut order, _) = placed_order(&[(1000, 1), (2000, 2), (3000, 3)], 2500);
        order.execute(|o| o.cancel("customer request")).unwrap();

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(order.items().iter().all(|i| i.is_cancelled()));
        assert_eq!(order.active_items().count(), 0);
    }

    #[test]
    fn terminal_orders_reject_every_command() {
        let (mut order, _) = placed_order(&[(1000, 1)], 0);
        order.execute(|o| o.cancel("no longer needed")).unwrap();

        let errors = [
            order.mark_as_paid(PaymentMethod::CreditCard, "PAY-1").unwrap_err(),
            order.start_preparing().unwrap_err(),
            order.ship("TRK").unwrap_err(),
            order.deliver().unwrap_err(),
            order.cancel("again").unwrap_err(),
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::InvalidState, "{err}");
        }
    }

    #[test]
    fn error_messages_name_the_violation() {
        let (mut order, _) = placed_order(&[(1000, 1)], 0);
        order
            .execute(|o| o.mark_as_paid(PaymentMethod::CreditCard, "PAY-1"))
            .unwrap();
        order.execute(|o| o.start_preparing()).unwrap();
        order.execute(|o| o.ship("TRK-1")).unwrap();

        let err = order.cancel("late").unwrap_err();
        assert_eq!(err.to_string(), "Order cannot be cancelled in SHIPPED status");
        assert!(matches!(err, OrderError::CannotCancel { .. }));
    }
}

mod payment_lifecycle {
    use super::*;

    #[test]
    fn payment_follows_order_total() {
        let (order, _) = placed_order(&[(29000, 2)], 3000);
        let (payment, events) =
            Payment::request(order.id(), PaymentMethod::CreditCard, order.total_amount()).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(payment.amount(), Money::new(61000));
        assert_eq!(payment.order_id(), order.id());
    }

    #[test]
    fn refund_keeps_amount_and_reference() {
        let (mut payment, _) =
            Payment::request(OrderId::new(), PaymentMethod::MobilePayment, Money::new(5000))
                .unwrap();
        let transaction_id = payment.transaction_id().to_string();

        payment.execute(|p| p.complete("PG-00FF00FF")).unwrap();
        payment.execute(|p| p.cancel()).unwrap();

        assert_eq!(payment.status(), PaymentStatus::Cancelled);
        assert_eq!(payment.amount(), Money::new(5000));
        assert_eq!(payment.transaction_id(), transaction_id);
        assert_eq!(payment.pg_transaction_id(), Some("PG-00FF00FF"));
    }

    #[test]
    fn failed_payment_cannot_be_refunded() {
        let (mut payment, _) =
            Payment::request(OrderId::new(), PaymentMethod::CreditCard, Money::new(9999)).unwrap();
        payment.execute(|p| p.fail("Card declined")).unwrap();

        assert!(matches!(
            payment.ensure_confirmable(),
            Err(PaymentError::AlreadyProcessed { .. })
        ));
        assert!(matches!(
            payment.cancel(),
            Err(PaymentError::NotCancellable { .. })
        ));
    }
}

mod coupon_redemption {
    use super::*;

    fn coupon(total_quantity: u32) -> Coupon {
        let now = Utc::now();
        Coupon::create(CreateCoupon {
            code: "TENOFF".to_string(),
            name: "Ten percent off".to_string(),
            coupon_type: CouponType::Percentage,
            discount_value: 10,
            minimum_order: Some(Money::new(10_000)),
            maximum_discount: Some(Money::new(5000)),
            valid_from: now - Duration::days(1),
            valid_to: now + Duration::days(7),
            total_quantity,
        })
        .unwrap()
        .0
    }

    #[test]
    fn discount_flows_into_order_total() {
        let coupon = coupon(10);
        let subtotal = Money::new(58000);
        let discount = coupon.calculate_discount(subtotal);
        assert_eq!(discount, Money::new(5000));

        let (member_coupon, _) = MemberCoupon::issue(MemberId::new(), &coupon).unwrap();
        let cmd = CreateOrder::new(member_coupon.member_id(), address())
            .with_shipping_fee(Money::new(3000))
            .with_member_coupon(member_coupon.id(), discount);
        let (mut order, _) = Order::create(cmd).unwrap();
        order
            .execute(|o| o.add_item(AddItem::new(ProductId::new(), "Hoodie", Money::new(29000), 2)))
            .unwrap();

        assert_eq!(order.total_amount(), Money::new(56000));
        assert_eq!(order.member_coupon_id(), Some(member_coupon.id()));
    }

    #[test]
    fn redeem_and_restore_keep_counters_consistent() {
        let mut coupon = coupon(1);
        let (mut member_coupon, _) = MemberCoupon::issue(MemberId::new(), &coupon).unwrap();

        let order_id = OrderId::new();
        member_coupon
            .execute(|m| m.use_for(&coupon, order_id, Utc::now()))
            .unwrap();
        coupon.execute(|c| c.use_one()).unwrap();
        assert_eq!(coupon.used_quantity(), 1);

        let other = MemberCoupon::issue(MemberId::new(), &coupon);
        assert!(matches!(other, Err(CouponError::LimitExceeded)));

        let restored = member_coupon.restore();
        member_coupon.apply_events(restored);
        let restored = coupon.restore_quantity();
        coupon.apply_events(restored);

        assert!(!member_coupon.is_used());
        assert_eq!(coupon.used_quantity(), 0);
        assert!(coupon.has_quantity_available());
    }
}
