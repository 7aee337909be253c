//! Order search criteria.

use chrono::{DateTime, Utc};
use common::MemberId;
use serde::{Deserialize, Serialize};

use super::{Order, OrderError, OrderStatus};

/// Filters for order searches. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSearchCondition {
    pub member_id: Option<MemberId>,
    pub status: Option<OrderStatus>,
    /// Case-insensitive substring of the order number.
    pub order_number: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl OrderSearchCondition {
    pub fn for_member(member_id: MemberId) -> Self {
        Self {
            member_id: Some(member_id),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn validate(&self) -> Result<(), OrderError> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date)
            && start > end
        {
            return Err(OrderError::InvalidDateRange { start, end });
        }
        Ok(())
    }

    /// Blank order-number filters are treated as unset.
    pub fn order_number_filter(&self) -> Option<&str> {
        self.order_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// In-process evaluation, used by the in-memory store.
    pub fn matches(&self, order: &Order) -> bool {
        if self.member_id.is_some_and(|m| m != order.member_id()) {
            return false;
        }
        if self.status.is_some_and(|s| s != order.status()) {
            return false;
        }
        if let Some(needle) = self.order_number_filter()
            && !order
                .order_number()
                .to_lowercase()
                .contains(&needle.to_lowercase())
        {
            return false;
        }
        if self.start_date.is_some_and(|start| order.created_at() < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| order.created_at() > end) {
            return false;
        }
        true
    }
}
