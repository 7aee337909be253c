use domain::ErrorKind;
use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when reading or writing aggregates.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The aggregate was changed by someone else since it was loaded.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// A uniqueness constraint other than the version rejected the write.
    #[error("Duplicate key violates constraint {constraint}")]
    DuplicateKey { constraint: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::ConcurrencyConflict { .. } | StoreError::DuplicateKey { .. } => {
                ErrorKind::InvalidState
            }
            _ => ErrorKind::Internal,
        }
    }

    pub fn is_duplicate(&self, constraint: &str) -> bool {
        matches!(self, StoreError::DuplicateKey { constraint: c } if c == constraint)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Constraint names shared by both backends.
pub mod constraints {
    pub const ORDER_NUMBER: &str = "unique_order_number";
    pub const TRANSACTION_ID: &str = "unique_transaction_id";
    pub const COUPON_CODE: &str = "unique_coupon_code";
    pub const MEMBER_COUPON: &str = "unique_member_coupon";
    pub const AGGREGATE_VERSION: &str = "unique_aggregate_version";
}
