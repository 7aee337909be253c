//! Application workflows of the commerce core.
//!
//! This crate provides:
//! - `OrderWorkflowService`: order creation with stock and coupon handling,
//!   status transitions, cancellation with compensation
//! - `PaymentWorkflowService`: payment request, confirmation against the
//!   gateway with refund on failed settlement, cancellation
//! - `CouponService`: coupon administration, issuance and redemption
//!
//! Inventory, the payment gateway and notifications are reached through the
//! ports in [`services`]; in-memory versions are included for tests and the
//! standalone server.

pub mod coupon_service;
pub mod error;
pub mod order_service;
pub mod payment_service;
pub mod requester;
pub mod services;

pub use coupon_service::{CouponService, DiscountQuote, MemberCouponDetails};
pub use error::{Result, WorkflowError};
pub use order_service::{CreateOrderRequest, OrderWorkflowService};
pub use payment_service::PaymentWorkflowService;
pub use requester::{Requester, Role};
pub use services::{
    GatewayError, GatewayResult, InMemoryInventory, InMemoryNotifier, InventoryAdjuster,
    InventoryError, LoggingNotifier, MockPaymentGateway, Notification, NotificationError,
    Notifier, PaymentGateway, StockAdjustment, StockKey,
};
