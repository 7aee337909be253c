//! A coupon issued to one member.

use chrono::{DateTime, Utc};
use common::{AggregateId, CouponId, MemberCouponId, MemberId, OrderId, Version};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{Coupon, CouponError, MemberCouponEvent};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberCoupon {
    id: MemberCouponId,

    #[serde(default)]
    version: Version,

    member_id: MemberId,
    coupon_id: CouponId,
    used: bool,
    used_at: Option<DateTime<Utc>>,
    order_id: Option<OrderId>,
    issued_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Aggregate for MemberCoupon {
    type Event = MemberCouponEvent;
    type Error = CouponError;

    fn aggregate_type() -> &'static str {
        "MemberCoupon"
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
            MemberCouponEvent::MemberCouponIssued {
                member_coupon_id,
                member_id,
                coupon_id,
                issued_at,
            } => {
                self.id = member_coupon_id;
                self.member_id = member_id;
                self.coupon_id = coupon_id;
                self.used = false;
                self.issued_at = issued_at;
                self.updated_at = issued_at;
            }
            MemberCouponEvent::MemberCouponUsed { order_id, used_at } => {
                self.used = true;
                self.used_at = Some(used_at);
                self.order_id = Some(order_id);
                self.updated_at = used_at;
            }
            MemberCouponEvent::MemberCouponRestored { restored_at } => {
                self.used = false;
                self.used_at = None;
                self.order_id = None;
                self.updated_at = restored_at;
            }
        }
    }
}

impl MemberCoupon {
    pub fn id(&self) -> MemberCouponId {
        self.id
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn coupon_id(&self) -> CouponId {
        self.coupon_id
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    pub fn used_at(&self) -> Option<DateTime<Utc>> {
        self.used_at
    }

    /// Order the coupon was spent on, while used.
    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_owned_by(&self, member_id: MemberId) -> bool {
        self.member_id == member_id
    }

    pub fn is_available(&self, coupon: &Coupon, now: DateTime<Utc>) -> bool {
        !self.used && coupon.is_valid_at(now)
    }

    pub fn is_expired(&self, coupon: &Coupon, now: DateTime<Utc>) -> bool {
        now > coupon.valid_to()
    }
}

impl MemberCoupon {
    /// Issues `coupon` to `member_id`. Fails when nothing is left to hand out.
    pub fn issue(
        member_id: MemberId,
        coupon: &Coupon,
    ) -> Result<(MemberCoupon, Vec<MemberCouponEvent>), CouponError> {
        if coupon.is_deleted() {
            return Err(CouponError::Deleted);
        }
        if !coupon.has_quantity_available() {
            return Err(CouponError::LimitExceeded);
        }

        let events = vec![MemberCouponEvent::MemberCouponIssued {
            member_coupon_id: MemberCouponId::new(),
            member_id,
            coupon_id: coupon.id(),
            issued_at: Utc::now(),
        }];

        let mut member_coupon = MemberCoupon::default();
        member_coupon.apply_events(events.clone());
        Ok((member_coupon, events))
    }

    /// Spends this coupon on `order_id`.
    ///
    /// The caller must also consume one unit on the coupon itself
    /// ([`Coupon::use_one`]) in the same unit of work.
    pub fn use_for(
        &self,
        coupon: &Coupon,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Vec<MemberCouponEvent>, CouponError> {
        if self.used {
            return Err(CouponError::AlreadyUsed);
        }
        if !coupon.is_valid_at(now) {
            return Err(CouponError::Expired);
        }
        Ok(vec![MemberCouponEvent::MemberCouponUsed {
            order_id,
            used_at: now,
        }])
    }

    /// Clears usage. Nothing happens when the coupon was never used.
    pub fn restore(&self) -> Vec<MemberCouponEvent> {
        if !self.used {
            return vec![];
        }
        vec![MemberCouponEvent::MemberCouponRestored {
            restored_at: Utc::now(),
        }]
    }
}
