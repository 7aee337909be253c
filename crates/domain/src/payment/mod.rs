//! Payment aggregate and related types.

mod aggregate;
mod events;
mod state;

pub use aggregate::Payment;
pub use events::{
    PaymentCancelledData, PaymentCompletedData, PaymentEvent, PaymentFailedData,
    PaymentRequestedData,
};
pub use state::{PaymentMethod, PaymentStatus};

use thiserror::Error;

use crate::error::ErrorKind;
use crate::money::Money;

/// Errors that can occur during payment operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Cannot transition payment from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// Confirmation was attempted on a payment that already left `PENDING`.
    #[error("Payment already processed: {status}")]
    AlreadyProcessed { status: PaymentStatus },

    #[error("Only completed payments can be cancelled, current status: {status}")]
    NotCancellable { status: PaymentStatus },

    #[error("Payment amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: Money, actual: Money },

    #[error("Payment amount cannot be negative: {amount}")]
    NegativeAmount { amount: Money },
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::NegativeAmount { .. } => ErrorKind::Validation,
            _ => ErrorKind::InvalidState,
        }
    }
}
