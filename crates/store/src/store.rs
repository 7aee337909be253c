use async_trait::async_trait;
use common::{
    CouponId, MemberCouponId, MemberId, OrderId, Page, PageRequest, PaymentId,
};
use domain::{
    Coupon, CouponEvent, CouponSearchCondition, MemberCoupon, MemberCouponEvent, Order,
    OrderEvent, OrderSearchCondition, Payment, PaymentEvent,
};

use crate::{AggregateId, EventEnvelope, Result, Version};

// Save contract shared by every repository:
// - the aggregate is passed in its post-command state, still carrying the
//   version it was loaded at;
// - the write succeeds only if the stored version equals that version,
//   otherwise `ConcurrencyConflict`;
// - the new version is the loaded version plus the number of events, and
//   each event lands in the outbox with its own version;
// - an empty event list writes nothing and returns the current version.

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn save_order(&self, order: &Order, events: &[OrderEvent]) -> Result<Version>;

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    async fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>>;

    /// Newest first.
    async fn search_orders(
        &self,
        condition: &OrderSearchCondition,
        page: PageRequest,
    ) -> Result<Page<Order>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn save_payment(&self, payment: &Payment, events: &[PaymentEvent]) -> Result<Version>;

    /// Writes a completed payment and the order it pays in one unit of work.
    ///
    /// Either both versions advance or neither does.
    async fn save_settlement(
        &self,
        payment: &Payment,
        payment_events: &[PaymentEvent],
        order: &Order,
        order_events: &[OrderEvent],
    ) -> Result<(Version, Version)>;

    async fn find_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>>;

    async fn find_payment_by_transaction_id(&self, transaction_id: &str)
    -> Result<Option<Payment>>;

    /// Newest first.
    async fn find_payments_by_order(&self, order_id: OrderId) -> Result<Vec<Payment>>;
}

/// Coupons are returned whether or not they are soft deleted; callers decide
/// visibility. Searches never return deleted coupons.
#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn save_coupon(&self, coupon: &Coupon, events: &[CouponEvent]) -> Result<Version>;

    async fn find_coupon(&self, coupon_id: CouponId) -> Result<Option<Coupon>>;

    /// `code` is matched upper-cased.
    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    /// Newest first.
    async fn search_coupons(
        &self,
        condition: &CouponSearchCondition,
        page: PageRequest,
    ) -> Result<Page<Coupon>>;

    /// Fails with `DuplicateKey` when the member already holds the coupon.
    async fn save_member_coupon(
        &self,
        member_coupon: &MemberCoupon,
        events: &[MemberCouponEvent],
    ) -> Result<Version>;

    async fn find_member_coupon(
        &self,
        member_coupon_id: MemberCouponId,
    ) -> Result<Option<MemberCoupon>>;

    async fn find_member_coupon_by_member_and_coupon(
        &self,
        member_id: MemberId,
        coupon_id: CouponId,
    ) -> Result<Option<MemberCoupon>>;

    /// Newest issuance first.
    async fn find_member_coupons(&self, member_id: MemberId) -> Result<Vec<MemberCoupon>>;

    /// Writes a coupon's usage counter and a member coupon's usage together.
    async fn save_redemption(
        &self,
        coupon: &Coupon,
        coupon_events: &[CouponEvent],
        member_coupon: &MemberCoupon,
        member_coupon_events: &[MemberCouponEvent],
    ) -> Result<(Version, Version)>;
}

/// Read access to the outbox.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Events of one aggregate in version order.
    async fn events_for_aggregate(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>>;
}

/// Everything the workflow services need from persistence.
pub trait Store:
    OrderRepository + PaymentRepository + CouponRepository + EventLog + Clone + 'static
{
}

impl<T> Store for T where
    T: OrderRepository + PaymentRepository + CouponRepository + EventLog + Clone + 'static
{
}
