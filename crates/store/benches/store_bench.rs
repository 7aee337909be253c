use common::{MemberId, PageRequest, ProductId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    AddItem, Aggregate, CreateOrder, Money, Order, OrderSearchCondition, PaymentMethod,
    ShippingAddress,
};
use store::{InMemoryStore, OrderRepository};

fn new_order(member_id: MemberId) -> (Order, Vec<domain::OrderEvent>) {
    let address = ShippingAddress::new("Bench", "010-0000-0000", "00000", "Bench-ro 1", None);
    let (mut order, mut events) = Order::create(CreateOrder::new(member_id, address)).unwrap();
    events.extend(
        order
            .execute(|o| o.add_item(AddItem::new(ProductId::new(), "Item", Money::new(1000), 1)))
            .unwrap(),
    );
    (order, events)
}

fn bench_save_new_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("store/save_new_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStore::new();
                let (order, events) = new_order(MemberId::new());
                store.save_order(&order, &events).await.unwrap();
            });
        });
    });
}

fn bench_save_with_version_check(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("store/save_update_with_version_check", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStore::new();
                let (mut order, events) = new_order(MemberId::new());
                let version = store.save_order(&order, &events).await.unwrap();
                order.set_version(version);

                let events = order
                    .execute(|o| o.mark_as_paid(PaymentMethod::CreditCard, "PAY-BENCH"))
                    .unwrap();
                store.save_order(&order, &events).await.unwrap();
            });
        });
    });
}

fn bench_search_orders(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let member_id = MemberId::new();

    // 100 orders for one member, 100 for others
    rt.block_on(async {
        for i in 0..200 {
            let owner = if i % 2 == 0 { member_id } else { MemberId::new() };
            let (order, events) = new_order(owner);
            store.save_order(&order, &events).await.unwrap();
        }
    });

    let condition = OrderSearchCondition::for_member(member_id);
    c.bench_function("store/search_orders_by_member", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .search_orders(&condition, PageRequest::first())
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_save_new_order,
    bench_save_with_version_check,
    bench_search_orders,
);
criterion_main!(benches);
