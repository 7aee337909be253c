//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod search;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use commands::{AddItem, CreateOrder};
pub use events::{
    ItemAddedData, ItemCancelledData, OrderCancelledData, OrderCreatedData, OrderDeliveredData,
    OrderEvent, OrderPaidData, OrderShippedData, PreparationStartedData,
};
pub use search::OrderSearchCondition;
pub use state::{OrderItemStatus, OrderStatus};
pub use value_objects::{OrderItem, ShippingAddress};

use chrono::{DateTime, Utc};
use common::OrderItemId;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::money::Money;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    /// The requested status is not reachable from the current one.
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order cannot be cancelled in {status} status")]
    CannotCancel { status: OrderStatus },

    #[error("Items cannot be added to an order in {status} status")]
    ItemsLocked { status: OrderStatus },

    #[error("Order item {item_id} cannot be cancelled in {status} status")]
    ItemNotCancellable {
        item_id: OrderItemId,
        status: OrderItemStatus,
    },

    #[error("Order item not found: {item_id}")]
    ItemNotFound { item_id: OrderItemId },

    #[error("Quantity must be positive")]
    InvalidQuantity,

    #[error("Price cannot be negative: {price}")]
    NegativePrice { price: Money },

    #[error("{field} cannot be negative: {amount}")]
    NegativeAmount { field: &'static str, amount: Money },

    #[error("Order must have at least one item")]
    NoItems,

    #[error("Order amount is too large")]
    AmountOverflow,

    #[error("Tracking number is required")]
    TrackingNumberRequired,

    #[error("Shipping address field {field} is required")]
    AddressFieldRequired { field: &'static str },

    #[error("Start date must be before end date: {start} > {end}")]
    InvalidDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::InvalidTransition { .. }
            | OrderError::CannotCancel { .. }
            | OrderError::ItemsLocked { .. }
            | OrderError::ItemNotCancellable { .. } => ErrorKind::InvalidState,
            OrderError::ItemNotFound { .. } => ErrorKind::NotFound,
            OrderError::InvalidQuantity
            | OrderError::NegativePrice { .. }
            | OrderError::NegativeAmount { .. }
            | OrderError::NoItems
            | OrderError::AmountOverflow
            | OrderError::TrackingNumberRequired
            | OrderError::AddressFieldRequired { .. }
            | OrderError::InvalidDateRange { .. } => ErrorKind::Validation,
        }
    }
}
