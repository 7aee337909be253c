//! Shared types used across the commerce crates.

pub mod page;
pub mod types;

pub use page::{Page, PageError, PageRequest};
pub use types::{
    AggregateId, CouponId, MemberCouponId, MemberId, OrderId, OrderItemId, PaymentId, ProductId,
    ProductOptionId, Version,
};
