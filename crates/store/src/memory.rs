use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use common::{
    CouponId, MemberCouponId, MemberId, OrderId, Page, PageRequest, PaymentId,
};
use domain::{
    Aggregate, Coupon, CouponEvent, CouponSearchCondition, MemberCoupon, MemberCouponEvent, Order,
    OrderEvent, OrderSearchCondition, Payment, PaymentEvent,
};
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, Result, StoreError, Version, build_envelopes,
    error::constraints,
    store::{CouponRepository, EventLog, OrderRepository, PaymentRepository},
};

/// In-memory store for tests and database-less runs.
///
/// One lock guards every table, so multi-aggregate writes are atomic.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
    coupons: HashMap<CouponId, Coupon>,
    member_coupons: HashMap<MemberCouponId, MemberCoupon>,
    events: Vec<EventEnvelope>,
}

/// A validated write, ready to be committed.
struct Staged<A> {
    aggregate: A,
    envelopes: Vec<EventEnvelope>,
}

impl<A: Aggregate> Staged<A> {
    fn version(&self) -> Version {
        self.aggregate.version()
    }
}

/// Checks the version and prepares the stored copy and its envelopes.
///
/// Returns `None` when there is nothing to write.
fn stage<A: Aggregate>(
    current: Option<&A>,
    aggregate: &A,
    events: &[A::Event],
) -> Result<Option<Staged<A>>> {
    let expected = aggregate.version();
    let actual = current.map(Aggregate::version).unwrap_or_default();
    if actual != expected {
        tracing::debug!(aggregate_id = %aggregate.aggregate_id(), %expected, %actual, "version conflict");
        metrics::counter!("store_concurrency_conflicts_total").increment(1);
        return Err(StoreError::ConcurrencyConflict {
            aggregate_id: aggregate.aggregate_id(),
            expected,
            actual,
        });
    }
    if events.is_empty() {
        return Ok(None);
    }

    let envelopes = build_envelopes(aggregate, events)?;
    let mut stored = aggregate.clone();
    stored.set_version(expected.advance(events.len()));
    Ok(Some(Staged {
        aggregate: stored,
        envelopes,
    }))
}

fn commit<K: Eq + Hash, A: Aggregate>(
    table: &mut HashMap<K, A>,
    log: &mut Vec<EventEnvelope>,
    key: K,
    staged: Option<Staged<A>>,
    unchanged: Version,
) -> Version {
    match staged {
        Some(staged) => {
            let version = staged.version();
            log.extend(staged.envelopes);
            table.insert(key, staged.aggregate);
            version
        }
        None => unchanged,
    }
}

fn newest_first<T>(mut items: Vec<T>, created_at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events in the outbox.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Clears every table.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = MemoryState::default();
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn save_order(&self, order: &Order, events: &[OrderEvent]) -> Result<Version> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let current = state.orders.get(&order.id());
        if current.is_none()
            && state
                .orders
                .values()
                .any(|o| o.order_number() == order.order_number())
        {
            return Err(StoreError::DuplicateKey {
                constraint: constraints::ORDER_NUMBER.to_string(),
            });
        }

        let staged = stage(current, order, events)?;
        Ok(commit(
            &mut state.orders,
            &mut state.events,
            order.id(),
            staged,
            order.version(),
        ))
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.order_number() == order_number)
            .cloned())
    }

    async fn search_orders(
        &self,
        condition: &OrderSearchCondition,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        let state = self.state.read().await;
        let matching: Vec<Order> = state
            .orders
            .values()
            .filter(|o| condition.matches(o))
            .cloned()
            .collect();
        Ok(Page::from_all(newest_first(matching, Order::created_at), page))
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn save_payment(&self, payment: &Payment, events: &[PaymentEvent]) -> Result<Version> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let current = state.payments.get(&payment.id());
        if current.is_none()
            && state
                .payments
                .values()
                .any(|p| p.transaction_id() == payment.transaction_id())
        {
            return Err(StoreError::DuplicateKey {
                constraint: constraints::TRANSACTION_ID.to_string(),
            });
        }

        let staged = stage(current, payment, events)?;
        Ok(commit(
            &mut state.payments,
            &mut state.events,
            payment.id(),
            staged,
            payment.version(),
        ))
    }

    async fn save_settlement(
        &self,
        payment: &Payment,
        payment_events: &[PaymentEvent],
        order: &Order,
        order_events: &[OrderEvent],
    ) -> Result<(Version, Version)> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        // Both checks run before either table changes.
        let staged_payment = stage(state.payments.get(&payment.id()), payment, payment_events)?;
        let staged_order = stage(state.orders.get(&order.id()), order, order_events)?;

        let payment_version = commit(
            &mut state.payments,
            &mut state.events,
            payment.id(),
            staged_payment,
            payment.version(),
        );
        let order_version = commit(
            &mut state.orders,
            &mut state.events,
            order.id(),
            staged_order,
            order.version(),
        );
        Ok((payment_version, order_version))
    }

    async fn find_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.state.read().await.payments.get(&payment_id).cloned())
    }

    async fn find_payment_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.transaction_id() == transaction_id)
            .cloned())
    }

    async fn find_payments_by_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        let payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.order_id() == order_id)
            .cloned()
            .collect();
        Ok(newest_first(payments, Payment::created_at))
    }
}

#[async_trait]
impl CouponRepository for InMemoryStore {
    async fn save_coupon(&self, coupon: &Coupon, events: &[CouponEvent]) -> Result<Version> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let current = state.coupons.get(&coupon.id());
        if current.is_none() && state.coupons.values().any(|c| c.code() == coupon.code()) {
            return Err(StoreError::DuplicateKey {
                constraint: constraints::COUPON_CODE.to_string(),
            });
        }

        let staged = stage(current, coupon, events)?;
        Ok(commit(
            &mut state.coupons,
            &mut state.events,
            coupon.id(),
            staged,
            coupon.version(),
        ))
    }

    async fn find_coupon(&self, coupon_id: CouponId) -> Result<Option<Coupon>> {
        Ok(self.state.read().await.coupons.get(&coupon_id).cloned())
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let code = code.trim().to_uppercase();
        let state = self.state.read().await;
        Ok(state.coupons.values().find(|c| c.code() == code).cloned())
    }

    async fn search_coupons(
        &self,
        condition: &CouponSearchCondition,
        page: PageRequest,
    ) -> Result<Page<Coupon>> {
        let state = self.state.read().await;
        let matching: Vec<Coupon> = state
            .coupons
            .values()
            .filter(|c| condition.matches(c))
            .cloned()
            .collect();
        Ok(Page::from_all(newest_first(matching, Coupon::created_at), page))
    }

    async fn save_member_coupon(
        &self,
        member_coupon: &MemberCoupon,
        events: &[MemberCouponEvent],
    ) -> Result<Version> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let current = state.member_coupons.get(&member_coupon.id());
        if current.is_none()
            && state.member_coupons.values().any(|mc| {
                mc.member_id() == member_coupon.member_id()
                    && mc.coupon_id() == member_coupon.coupon_id()
            })
        {
            return Err(StoreError::DuplicateKey {
                constraint: constraints::MEMBER_COUPON.to_string(),
            });
        }

        let staged = stage(current, member_coupon, events)?;
        Ok(commit(
            &mut state.member_coupons,
            &mut state.events,
            member_coupon.id(),
            staged,
            member_coupon.version(),
        ))
    }

    async fn find_member_coupon(
        &self,
        member_coupon_id: MemberCouponId,
    ) -> Result<Option<MemberCoupon>> {
        Ok(self
            .state
            .read()
            .await
            .member_coupons
            .get(&member_coupon_id)
            .cloned())
    }

    async fn find_member_coupon_by_member_and_coupon(
        &self,
        member_id: MemberId,
        coupon_id: CouponId,
    ) -> Result<Option<MemberCoupon>> {
        let state = self.state.read().await;
        Ok(state
            .member_coupons
            .values()
            .find(|mc| mc.member_id() == member_id && mc.coupon_id() == coupon_id)
            .cloned())
    }

    async fn find_member_coupons(&self, member_id: MemberId) -> Result<Vec<MemberCoupon>> {
        let state = self.state.read().await;
        let owned: Vec<MemberCoupon> = state
            .member_coupons
            .values()
            .filter(|mc| mc.member_id() == member_id)
            .cloned()
            .collect();
        Ok(newest_first(owned, MemberCoupon::issued_at))
    }

    async fn save_redemption(
        &self,
        coupon: &Coupon,
        coupon_events: &[CouponEvent],
        member_coupon: &MemberCoupon,
        member_coupon_events: &[MemberCouponEvent],
    ) -> Result<(Version, Version)> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let staged_coupon = stage(state.coupons.get(&coupon.id()), coupon, coupon_events)?;
        let staged_member_coupon = stage(
            state.member_coupons.get(&member_coupon.id()),
            member_coupon,
            member_coupon_events,
        )?;

        let coupon_version = commit(
            &mut state.coupons,
            &mut state.events,
            coupon.id(),
            staged_coupon,
            coupon.version(),
        );
        let member_coupon_version = commit(
            &mut state.member_coupons,
            &mut state.events,
            member_coupon.id(),
            staged_member_coupon,
            member_coupon.version(),
        );
        Ok((coupon_version, member_coupon_version))
    }
}

#[async_trait]
impl EventLog for InMemoryStore {
    async fn events_for_aggregate(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }
}
