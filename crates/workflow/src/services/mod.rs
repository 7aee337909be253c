//! Ports to collaborators outside the order and payment core, with
//! in-memory implementations.

use std::collections::VecDeque;

pub mod inventory;
pub mod notification;
pub mod payment_gateway;

pub use inventory::{InMemoryInventory, InventoryAdjuster, InventoryError, StockAdjustment, StockKey};
pub use notification::{InMemoryNotifier, LoggingNotifier, Notification, NotificationError, Notifier};
pub use payment_gateway::{GatewayError, GatewayResult, MockPaymentGateway, PaymentGateway};

/// How many calls the in-memory ports remember for inspection.
pub const CALL_LOG_CAPACITY: usize = 1024;

/// Appends to a call log, dropping the oldest entry once it is full.
pub(crate) fn record_call<T>(log: &mut VecDeque<T>, entry: T) {
    if log.len() == CALL_LOG_CAPACITY {
        log.pop_front();
    }
    log.push_back(entry);
}
