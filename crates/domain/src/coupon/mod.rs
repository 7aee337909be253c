//! Coupon and member coupon aggregates.
//!
//! A [`Coupon`] holds the discount rules and the shared usage counter; a
//! [`MemberCoupon`] is one issuance of that coupon to a member.

mod aggregate;
mod commands;
mod events;
mod member_coupon;

pub use aggregate::{Coupon, CouponLifecycle, CouponType};
pub use commands::{CouponSearchCondition, CouponUpdate, CreateCoupon};
pub use events::{CouponCreatedData, CouponEvent, CouponUpdatedData, MemberCouponEvent};
pub use member_coupon::MemberCoupon;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::money::Money;

/// Maximum length of a coupon code.
pub const MAX_CODE_LENGTH: usize = 50;

/// Maximum length of a coupon name.
pub const MAX_NAME_LENGTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("Invalid coupon code: {0}")]
    InvalidCode(&'static str),

    #[error("Coupon name is required")]
    NameRequired,

    #[error("Coupon name must be at most {MAX_NAME_LENGTH} characters")]
    NameTooLong,

    #[error("Discount value must be positive")]
    NonPositiveDiscount,

    #[error("Percentage discount cannot exceed 100%: {value}")]
    PercentageTooLarge { value: i64 },

    #[error("{field} cannot be negative: {amount}")]
    NegativeAmount { field: &'static str, amount: Money },

    #[error("Valid to date must be after valid from date: {from} >= {to}")]
    InvalidValidity {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("Total quantity must be at least 1")]
    InvalidQuantity,

    #[error("Coupon usage limit exceeded")]
    LimitExceeded,

    #[error("Coupon already used")]
    AlreadyUsed,

    #[error("Coupon has expired or is no longer valid")]
    Expired,

    #[error("Coupon is not applicable to this order")]
    NotApplicable,

    #[error("Coupon has been deleted")]
    Deleted,
}

impl CouponError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CouponError::LimitExceeded
            | CouponError::AlreadyUsed
            | CouponError::Expired
            | CouponError::NotApplicable
            | CouponError::Deleted => ErrorKind::InvalidState,
            _ => ErrorKind::Validation,
        }
    }
}
