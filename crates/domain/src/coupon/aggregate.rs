//! Coupon aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, CouponId, Version};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::money::Money;

use super::{
    CouponError, CouponEvent, CouponUpdate, CreateCoupon,
    commands::{validate_name, validate_non_negative, validate_window},
    events::{CouponCreatedData, CouponUpdatedData},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponType {
    /// `discount_value` percent off, optionally capped.
    #[default]
    Percentage,
    /// `discount_value` off, never more than the order amount.
    FixedAmount,
}

impl CouponType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponType::Percentage => "PERCENTAGE",
            CouponType::FixedAmount => "FIXED_AMOUNT",
        }
    }
}

impl std::fmt::Display for CouponType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a coupon still exists for lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponLifecycle {
    #[default]
    Active,
    Deleted { deleted_at: DateTime<Utc> },
}

/// Discount coupon with its rules and shared usage counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Coupon {
    id: CouponId,

    #[serde(default)]
    version: Version,

    code: String,
    name: String,
    coupon_type: CouponType,
    discount_value: i64,
    minimum_order: Money,
    maximum_discount: Option<Money>,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    total_quantity: u32,
    used_quantity: u32,
    active: bool,
    lifecycle: CouponLifecycle,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Aggregate for Coupon {
    type Event = CouponEvent;
    type Error = CouponError;

    fn aggregate_type() -> &'static str {
        "Coupon"
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
            CouponEvent::CouponCreated(data) => self.apply_created(data),
            CouponEvent::CouponUpdated(data) => {
                self.name = data.name;
                self.minimum_order = data.minimum_order;
                self.maximum_discount = data.maximum_discount;
                self.valid_from = data.valid_from;
                self.valid_to = data.valid_to;
                self.updated_at = data.updated_at;
            }
            CouponEvent::CouponActivated { at } => {
                self.active = true;
                self.updated_at = at;
            }
            CouponEvent::CouponDeactivated { at } => {
                self.active = false;
                self.updated_at = at;
            }
            CouponEvent::CouponDeleted { deleted_at } => {
                self.active = false;
                self.lifecycle = CouponLifecycle::Deleted { deleted_at };
                self.updated_at = deleted_at;
            }
            CouponEvent::CouponUsed { at } => {
                self.used_quantity += 1;
                self.updated_at = at;
            }
            CouponEvent::CouponQuantityRestored { at } => {
                self.used_quantity = self.used_quantity.saturating_sub(1);
                self.updated_at = at;
            }
        }
    }
}

// Query methods
impl Coupon {
    pub fn id(&self) -> CouponId {
        self.id
    }

    /// Upper-cased code.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coupon_type(&self) -> CouponType {
        self.coupon_type
    }

    pub fn discount_value(&self) -> i64 {
        self.discount_value
    }

    pub fn minimum_order(&self) -> Money {
        self.minimum_order
    }

    pub fn maximum_discount(&self) -> Option<Money> {
        self.maximum_discount
    }

    pub fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }

    pub fn valid_to(&self) -> DateTime<Utc> {
        self.valid_to
    }

    pub fn total_quantity(&self) -> u32 {
        self.total_quantity
    }

    pub fn used_quantity(&self) -> u32 {
        self.used_quantity
    }

    pub fn remaining_quantity(&self) -> u32 {
        self.total_quantity.saturating_sub(self.used_quantity)
    }

    pub fn has_quantity_available(&self) -> bool {
        self.used_quantity < self.total_quantity
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn lifecycle(&self) -> CouponLifecycle {
        self.lifecycle
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.lifecycle, CouponLifecycle::Deleted { .. })
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Active, inside the validity window and not exhausted.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.active
            && !self.is_deleted()
            && now > self.valid_from
            && now < self.valid_to
            && self.has_quantity_available()
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_applicable_at(&self, order_amount: Money, now: DateTime<Utc>) -> bool {
        self.is_valid_at(now) && order_amount >= self.minimum_order
    }

    pub fn is_applicable(&self, order_amount: Money) -> bool {
        self.is_applicable_at(order_amount, Utc::now())
    }

    /// Discount this coupon's rules give on `order_amount`.
    ///
    /// Below the minimum order the discount is zero. Percentages round
    /// down and respect the cap; no discount ever exceeds the order amount.
    /// Validity is not checked here, see [`Coupon::is_applicable`].
    pub fn calculate_discount(&self, order_amount: Money) -> Money {
        if order_amount < self.minimum_order || !order_amount.is_positive() {
            return Money::zero();
        }

        let discount = match self.coupon_type {
            CouponType::Percentage => {
                let raw = order_amount.percentage(self.discount_value);
                match self.maximum_discount {
                    Some(cap) if raw > cap => cap,
                    _ => raw,
                }
            }
            CouponType::FixedAmount => Money::new(self.discount_value),
        };

        discount.min(order_amount)
    }
}

// Command methods
impl Coupon {
    pub fn create(cmd: CreateCoupon) -> Result<(Coupon, Vec<CouponEvent>), CouponError> {
        cmd.validate()?;

        let events = vec![CouponEvent::CouponCreated(CouponCreatedData {
            coupon_id: CouponId::new(),
            code: cmd.normalized_code(),
            name: cmd.name.trim().to_string(),
            coupon_type: cmd.coupon_type,
            discount_value: cmd.discount_value,
            minimum_order: cmd.minimum_order.unwrap_or_default(),
            maximum_discount: cmd.maximum_discount,
            valid_from: cmd.valid_from,
            valid_to: cmd.valid_to,
            total_quantity: cmd.total_quantity,
            created_at: Utc::now(),
        })];

        let mut coupon = Coupon::default();
        coupon.apply_events(events.clone());
        Ok((coupon, events))
    }

    pub fn update(&self, update: CouponUpdate) -> Result<Vec<CouponEvent>, CouponError> {
        self.ensure_not_deleted()?;
        if update.is_empty() {
            return Ok(vec![]);
        }

        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        validate_non_negative("minimum_order", update.minimum_order)?;
        validate_non_negative("maximum_discount", update.maximum_discount)?;

        let valid_from = update.valid_from.unwrap_or(self.valid_from);
        let valid_to = update.valid_to.unwrap_or(self.valid_to);
        validate_window(valid_from, valid_to)?;

        Ok(vec![CouponEvent::CouponUpdated(CouponUpdatedData {
            name: update
                .name
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|| self.name.clone()),
            minimum_order: update.minimum_order.unwrap_or(self.minimum_order),
            maximum_discount: update.maximum_discount.or(self.maximum_discount),
            valid_from,
            valid_to,
            updated_at: Utc::now(),
        })])
    }

    pub fn activate(&self) -> Result<Vec<CouponEvent>, CouponError> {
        self.ensure_not_deleted()?;
        if self.active {
            return Ok(vec![]);
        }
        Ok(vec![CouponEvent::CouponActivated { at: Utc::now() }])
    }

    pub fn deactivate(&self) -> Result<Vec<CouponEvent>, CouponError> {
        self.ensure_not_deleted()?;
        if !self.active {
            return Ok(vec![]);
        }
        Ok(vec![CouponEvent::CouponDeactivated { at: Utc::now() }])
    }

    /// Soft delete: the coupon is deactivated and hidden from lookups.
    pub fn delete(&self) -> Result<Vec<CouponEvent>, CouponError> {
        self.ensure_not_deleted()?;
        Ok(vec![CouponEvent::CouponDeleted {
            deleted_at: Utc::now(),
        }])
    }

    /// Consumes one unit of the total quantity.
    pub fn use_one(&self) -> Result<Vec<CouponEvent>, CouponError> {
        if !self.has_quantity_available() {
            return Err(CouponError::LimitExceeded);
        }
        Ok(vec![CouponEvent::CouponUsed { at: Utc::now() }])
    }

    /// Hands one consumed unit back. Nothing happens when none were used.
    pub fn restore_quantity(&self) -> Vec<CouponEvent> {
        if self.used_quantity == 0 {
            return vec![];
        }
        vec![CouponEvent::CouponQuantityRestored { at: Utc::now() }]
    }

    fn ensure_not_deleted(&self) -> Result<(), CouponError> {
        if self.is_deleted() {
            return Err(CouponError::Deleted);
        }
        Ok(())
    }
}

impl Coupon {
    fn apply_created(&mut self, data: CouponCreatedData) {
        self.id = data.coupon_id;
        self.code = data.code;
        self.name = data.name;
        self.coupon_type = data.coupon_type;
        self.discount_value = data.discount_value;
        self.minimum_order = data.minimum_order;
        self.maximum_discount = data.maximum_discount;
        self.valid_from = data.valid_from;
        self.valid_to = data.valid_to;
        self.total_quantity = data.total_quantity;
        self.used_quantity = 0;
        self.active = true;
        self.lifecycle = CouponLifecycle::Active;
        self.created_at = data.created_at;
        self.updated_at = data.created_at;
    }
}
