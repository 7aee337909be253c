//! Workflow error types.

use common::PageError;
use domain::{CouponError, ErrorKind, Money, OrderError, OrderStatus, PaymentError};
use store::StoreError;
use thiserror::Error;

use crate::services::{GatewayError, InventoryError};

/// Errors that can occur during workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Coupon not found: {0}")]
    CouponNotFound(String),

    #[error("Member coupon not found: {0}")]
    MemberCouponNotFound(String),

    /// The requester may not touch this resource.
    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Payment can only be requested for orders in PENDING_PAYMENT status, order is {status}")]
    OrderNotPayable { status: OrderStatus },

    #[error("Discount {discount} exceeds order amount {amount}")]
    DiscountExceedsAmount { discount: Money, amount: Money },

    #[error("Coupon code already exists")]
    DuplicateCouponCode,

    #[error("Coupon already issued to member")]
    CouponAlreadyIssued,

    #[error("Payment gateway refused the refund: {0}")]
    RefundDeclined(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::OrderNotFound(_)
            | WorkflowError::PaymentNotFound(_)
            | WorkflowError::CouponNotFound(_)
            | WorkflowError::MemberCouponNotFound(_) => ErrorKind::NotFound,
            WorkflowError::Forbidden(_)
            | WorkflowError::OrderNotPayable { .. }
            | WorkflowError::DuplicateCouponCode
            | WorkflowError::CouponAlreadyIssued => ErrorKind::InvalidState,
            WorkflowError::DiscountExceedsAmount { .. } | WorkflowError::Page(_) => {
                ErrorKind::Validation
            }
            WorkflowError::RefundDeclined(_) | WorkflowError::Gateway(_) => ErrorKind::External,
            WorkflowError::Order(e) => e.kind(),
            WorkflowError::Payment(e) => e.kind(),
            WorkflowError::Coupon(e) => e.kind(),
            WorkflowError::Inventory(e) => e.kind(),
            WorkflowError::Store(e) => e.kind(),
        }
    }

    /// True for ownership failures, which the HTTP layer reports as 403.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, WorkflowError::Forbidden(_))
    }
}

/// Convenience type alias for workflow results.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AggregateId, Version};

    #[test]
    fn concurrency_conflict_is_invalid_state() {
        let err = WorkflowError::from(StoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new(),
            expected: Version::new(2),
            actual: Version::new(3),
        });
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn domain_kinds_pass_through() {
        let err = WorkflowError::from(OrderError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Paid,
        });
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.to_string(), "Cannot transition from SHIPPED to PAID");

        let err = WorkflowError::from(OrderError::TrackingNumberRequired);
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn forbidden_is_flagged() {
        let err = WorkflowError::Forbidden("Not authorized to access this order");
        assert!(err.is_forbidden());
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(!WorkflowError::OrderNotFound("x".into()).is_forbidden());
    }

    #[test]
    fn gateway_errors_are_external() {
        let err = WorkflowError::from(GatewayError::Unavailable("timeout".into()));
        assert_eq!(err.kind(), ErrorKind::External);
    }
}
