//! Domain layer of the commerce core.
//!
//! This crate provides:
//! - Aggregate and DomainEvent traits shared by all aggregates
//! - Order aggregate with its status state machine and line items
//! - Payment aggregate with the request/confirm/cancel lifecycle
//! - Coupon and MemberCoupon aggregates with discount calculation
//!
//! Everything here is synchronous and free of I/O. Commands validate against
//! the current state and return events; `apply` folds events into state.

pub mod aggregate;
pub mod coupon;
pub mod error;
pub mod money;
pub mod order;
pub mod payment;

pub use aggregate::{Aggregate, DomainEvent};
pub use coupon::{
    Coupon, CouponError, CouponEvent, CouponLifecycle, CouponSearchCondition, CouponType,
    CouponUpdate, CreateCoupon, MemberCoupon, MemberCouponEvent,
};
pub use error::ErrorKind;
pub use money::Money;
pub use order::{
    AddItem, CreateOrder, Order, OrderError, OrderEvent, OrderItem, OrderItemStatus,
    OrderSearchCondition, OrderStatus, ShippingAddress,
};
pub use payment::{Payment, PaymentError, PaymentEvent, PaymentMethod, PaymentStatus};
