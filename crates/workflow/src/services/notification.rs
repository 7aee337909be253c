//! Customer notifications. Delivery is best effort.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::{MemberId, OrderId};
use domain::Money;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    PaymentCompleted {
        member_id: MemberId,
        order_id: OrderId,
        order_number: String,
        amount: Money,
    },
    OrderShipped {
        member_id: MemberId,
        order_id: OrderId,
        order_number: String,
        tracking_number: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::PaymentCompleted { .. } => "payment_completed",
            Notification::OrderShipped { .. } => "order_shipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotificationError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        tracing::info!(kind = notification.kind(), ?notification, "notification dispatched");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<Notification>,
    fail: bool,
}

/// Keeps sent notifications for inspection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryNotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fail(&self, fail: bool) {
        self.state().fail = fail;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.state().sent.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        let mut state = self.state();
        if state.fail {
            return Err(NotificationError("mail server unreachable".to_string()));
        }
        state.sent.push(notification);
        Ok(())
    }
}
