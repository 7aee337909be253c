//! Coupon and member coupon events.

use chrono::{DateTime, Utc};
use common::{CouponId, MemberCouponId, MemberId, OrderId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;

use super::CouponType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CouponEvent {
    CouponCreated(CouponCreatedData),
    CouponUpdated(CouponUpdatedData),
    CouponActivated { at: DateTime<Utc> },
    CouponDeactivated { at: DateTime<Utc> },
    CouponDeleted { deleted_at: DateTime<Utc> },
    /// One unit of the total quantity was consumed.
    CouponUsed { at: DateTime<Utc> },
    /// One consumed unit was handed back.
    CouponQuantityRestored { at: DateTime<Utc> },
}

impl DomainEvent for CouponEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CouponEvent::CouponCreated(_) => "CouponCreated",
            CouponEvent::CouponUpdated(_) => "CouponUpdated",
            CouponEvent::CouponActivated { .. } => "CouponActivated",
            CouponEvent::CouponDeactivated { .. } => "CouponDeactivated",
            CouponEvent::CouponDeleted { .. } => "CouponDeleted",
            CouponEvent::CouponUsed { .. } => "CouponUsed",
            CouponEvent::CouponQuantityRestored { .. } => "CouponQuantityRestored",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponCreatedData {
    pub coupon_id: CouponId,
    pub code: String,
    pub name: String,
    pub coupon_type: CouponType,
    pub discount_value: i64,
    pub minimum_order: Money,
    pub maximum_discount: Option<Money>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub total_quantity: u32,
    pub created_at: DateTime<Utc>,
}

/// Carries the full resulting values of the editable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponUpdatedData {
    pub name: String,
    pub minimum_order: Money,
    pub maximum_discount: Option<Money>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MemberCouponEvent {
    MemberCouponIssued {
        member_coupon_id: MemberCouponId,
        member_id: MemberId,
        coupon_id: CouponId,
        issued_at: DateTime<Utc>,
    },
    MemberCouponUsed {
        order_id: OrderId,
        used_at: DateTime<Utc>,
    },
    MemberCouponRestored {
        restored_at: DateTime<Utc>,
    },
}

impl DomainEvent for MemberCouponEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MemberCouponEvent::MemberCouponIssued { .. } => "MemberCouponIssued",
            MemberCouponEvent::MemberCouponUsed { .. } => "MemberCouponUsed",
            MemberCouponEvent::MemberCouponRestored { .. } => "MemberCouponRestored",
        }
    }
}
