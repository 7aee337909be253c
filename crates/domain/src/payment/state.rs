//! Payment status state machine and payment methods.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of a payment.
///
/// ```text
/// Pending ──► Completed ──► Cancelled
///    │
///    └──────► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Requested, waiting for gateway confirmation.
    #[default]
    Pending,

    /// Gateway approved the charge.
    Completed,

    /// Gateway declined or could not be reached (terminal state).
    Failed,

    /// Refunded after completion (terminal state).
    Cancelled,
}

static TRANSITIONS: &[(PaymentStatus, &[PaymentStatus])] = &[
    (
        PaymentStatus::Pending,
        &[PaymentStatus::Completed, PaymentStatus::Failed],
    ),
    (PaymentStatus::Completed, &[PaymentStatus::Cancelled]),
    (PaymentStatus::Failed, &[]),
    (PaymentStatus::Cancelled, &[]),
];

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
    ];

    pub fn allowed_transitions(&self) -> &'static [PaymentStatus] {
        TRANSITIONS
            .iter()
            .find(|(from, _)| from == self)
            .map(|(_, to)| *to)
            .unwrap_or(&[])
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Only a pending payment may be confirmed or failed.
    pub fn can_confirm(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    /// Only a completed payment may be refunded.
    pub fn can_cancel(&self) -> bool {
        matches!(self, PaymentStatus::Completed)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown payment status: {s}"))
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    CreditCard,
    BankTransfer,
    VirtualAccount,
    MobilePayment,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::VirtualAccount => "VIRTUAL_ACCOUNT",
            PaymentMethod::MobilePayment => "MOBILE_PAYMENT",
            PaymentMethod::CashOnDelivery => "CASH_ON_DELIVERY",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "Credit Card",
            PaymentMethod::BankTransfer => "Bank Transfer",
            PaymentMethod::VirtualAccount => "Virtual Account",
            PaymentMethod::MobilePayment => "Mobile Payment",
            PaymentMethod::CashOnDelivery => "Cash on Delivery",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
