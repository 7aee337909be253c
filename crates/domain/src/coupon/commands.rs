//! Coupon command payloads and search criteria.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

use super::{Coupon, CouponError, CouponType, MAX_CODE_LENGTH, MAX_NAME_LENGTH};

/// Defines a new coupon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCoupon {
    pub code: String,
    pub name: String,
    pub coupon_type: CouponType,
    /// Percent for `PERCENTAGE`, minor currency units for `FIXED_AMOUNT`.
    pub discount_value: i64,
    #[serde(default)]
    pub minimum_order: Option<Money>,
    /// Only meaningful for percentage coupons.
    #[serde(default)]
    pub maximum_discount: Option<Money>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub total_quantity: u32,
}

impl CreateCoupon {
    pub fn validate(&self) -> Result<(), CouponError> {
        let code = self.code.trim();
        if code.is_empty() {
            return Err(CouponError::InvalidCode("code is required"));
        }
        if code.len() > MAX_CODE_LENGTH {
            return Err(CouponError::InvalidCode("code must be at most 50 characters"));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CouponError::InvalidCode("code must be alphanumeric"));
        }

        validate_name(&self.name)?;

        if self.discount_value <= 0 {
            return Err(CouponError::NonPositiveDiscount);
        }
        if self.coupon_type == CouponType::Percentage && self.discount_value > 100 {
            return Err(CouponError::PercentageTooLarge {
                value: self.discount_value,
            });
        }

        validate_non_negative("minimum_order", self.minimum_order)?;
        validate_non_negative("maximum_discount", self.maximum_discount)?;
        validate_window(self.valid_from, self.valid_to)?;

        if self.total_quantity == 0 {
            return Err(CouponError::InvalidQuantity);
        }
        Ok(())
    }

    /// The code as stored: trimmed and upper-cased.
    pub fn normalized_code(&self) -> String {
        self.code.trim().to_uppercase()
    }
}

/// Partial update of a coupon's editable fields. Unset fields are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CouponUpdate {
    pub name: Option<String>,
    pub minimum_order: Option<Money>,
    pub maximum_discount: Option<Money>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl CouponUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.minimum_order.is_none()
            && self.maximum_discount.is_none()
            && self.valid_from.is_none()
            && self.valid_to.is_none()
    }
}

/// Filters for coupon listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponSearchCondition {
    #[serde(default)]
    pub active_only: bool,
    /// Case-insensitive substring of the code.
    pub code_contains: Option<String>,
}

impl CouponSearchCondition {
    pub fn code_filter(&self) -> Option<String> {
        self.code_contains
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase)
    }

    /// Deleted coupons never match.
    pub fn matches(&self, coupon: &Coupon) -> bool {
        if coupon.is_deleted() {
            return false;
        }
        if self.active_only && !coupon.is_active() {
            return false;
        }
        match self.code_filter() {
            Some(needle) => coupon.code().contains(&needle),
            None => true,
        }
    }
}

pub(super) fn validate_name(name: &str) -> Result<(), CouponError> {
    if name.trim().is_empty() {
        return Err(CouponError::NameRequired);
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(CouponError::NameTooLong);
    }
    Ok(())
}

pub(super) fn validate_non_negative(
    field: &'static str,
    amount: Option<Money>,
) -> Result<(), CouponError> {
    match amount {
        Some(amount) if amount.is_negative() => Err(CouponError::NegativeAmount { field, amount }),
        _ => Ok(()),
    }
}

pub(super) fn validate_window(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<(), CouponError> {
    if to <= from {
        return Err(CouponError::InvalidValidity { from, to });
    }
    Ok(())
}
