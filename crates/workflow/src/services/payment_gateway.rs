//! Payment gateway port and a mock gateway.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use domain::Money;
use thiserror::Error;
use uuid::Uuid;

use super::record_call;

/// Business outcome of a gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayResult {
    Success { pg_transaction_id: String },
    Failure { reason: String },
}

/// The gateway could not be reached or refused to talk to us.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Payment gateway declined the request: {0}")]
    Declined(String),
}

/// External payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn confirm_payment(
        &self,
        transaction_id: &str,
        amount: Money,
    ) -> Result<GatewayResult, GatewayError>;

    /// Refunds a confirmed payment identified by the gateway's own reference.
    async fn cancel_payment(
        &self,
        pg_transaction_id: &str,
        amount: Money,
    ) -> Result<GatewayResult, GatewayError>;
}

/// Amounts ending in this remainder are declined by the mock.
const DECLINE_REMAINDER: i64 = 9999;

#[derive(Debug, Default)]
struct MockGatewayState {
    confirmations: VecDeque<(String, Money)>,
    cancellations: VecDeque<(String, Money)>,
    unavailable: bool,
    fail_on_cancel: bool,
}

/// Gateway stand-in: approves everything except amounts ending in 9999.
#[derive(Debug, Clone, Default)]
pub struct MockPaymentGateway {
    state: Arc<Mutex<MockGatewayState>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockGatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every call fail with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Makes refunds come back as a business failure.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.state().fail_on_cancel = fail;
    }

    /// The most recent confirmations, oldest first.
    pub fn confirmations(&self) -> Vec<(String, Money)> {
        self.state().confirmations.iter().cloned().collect()
    }

    /// The most recent successful refunds, oldest first.
    pub fn cancellations(&self) -> Vec<(String, Money)> {
        self.state().cancellations.iter().cloned().collect()
    }
}

fn pg_reference() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("PG-{}", &hex[..8])
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn confirm_payment(
        &self,
        transaction_id: &str,
        amount: Money,
    ) -> Result<GatewayResult, GatewayError> {
        let mut state = self.state();
        if state.unavailable {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        record_call(
            &mut state.confirmations,
            (transaction_id.to_string(), amount),
        );

        if amount.amount() % 10000 == DECLINE_REMAINDER {
            return Ok(GatewayResult::Failure {
                reason: "Simulated payment failure: Card declined".to_string(),
            });
        }
        Ok(GatewayResult::Success {
            pg_transaction_id: pg_reference(),
        })
    }

    async fn cancel_payment(
        &self,
        pg_transaction_id: &str,
        amount: Money,
    ) -> Result<GatewayResult, GatewayError> {
        let mut state = self.state();
        if state.unavailable {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        if state.fail_on_cancel {
            return Ok(GatewayResult::Failure {
                reason: "Simulated cancellation failure".to_string(),
            });
        }
        record_call(
            &mut state.cancellations,
            (pg_transaction_id.to_string(), amount),
        );

        Ok(GatewayResult::Success {
            pg_transaction_id: pg_transaction_id.to_string(),
        })
    }
}
