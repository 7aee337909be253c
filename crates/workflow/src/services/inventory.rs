//! Inventory port and in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::{ProductId, ProductOptionId};
use domain::ErrorKind;
use thiserror::Error;

use super::record_call;

/// Stock is kept per option, or per product when the product has no options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StockKey {
    pub product_id: ProductId,
    pub option_id: Option<ProductOptionId>,
}

impl StockKey {
    pub fn new(product_id: ProductId, option_id: Option<ProductOptionId>) -> Self {
        Self {
            product_id,
            option_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Stock for product {product_id} cannot exceed {max}: have {available}, adding {quantity}")]
    StockOverflow {
        product_id: ProductId,
        available: u32,
        quantity: u32,
        max: u32,
    },

    #[error("Product option not found for product {product_id}")]
    UnknownProduct { product_id: ProductId },

    #[error("Inventory unavailable: {0}")]
    Unavailable(String),
}

impl InventoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::InsufficientStock { .. } | InventoryError::StockOverflow { .. } => {
                ErrorKind::InvalidState
            }
            InventoryError::UnknownProduct { .. } => ErrorKind::NotFound,
            InventoryError::Unavailable(_) => ErrorKind::Internal,
        }
    }
}

/// Stock adjustments made on behalf of orders.
#[async_trait]
pub trait InventoryAdjuster: Send + Sync {
    /// Takes `quantity` units. Never lets stock go below zero.
    async fn decrease_stock(
        &self,
        product_id: ProductId,
        option_id: Option<ProductOptionId>,
        quantity: u32,
    ) -> Result<(), InventoryError>;

    /// Puts `quantity` units back. Fails rather than wrap past `u32::MAX`.
    async fn increase_stock(
        &self,
        product_id: ProductId,
        option_id: Option<ProductOptionId>,
        quantity: u32,
    ) -> Result<(), InventoryError>;
}

/// One successful adjustment, positive for increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockAdjustment {
    pub key: StockKey,
    pub delta: i64,
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    stock: HashMap<StockKey, u32>,
    adjustments: VecDeque<StockAdjustment>,
    fail_on_increase: bool,
}

/// In-memory inventory for tests and the standalone server.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<Mutex<InMemoryInventoryState>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryInventoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the stock level, registering the key if it is new.
    pub fn set_stock(&self, product_id: ProductId, option_id: Option<ProductOptionId>, quantity: u32) {
        self.state()
            .stock
            .insert(StockKey::new(product_id, option_id), quantity);
    }

    pub fn stock_of(&self, product_id: ProductId, option_id: Option<ProductOptionId>) -> Option<u32> {
        self.state()
            .stock
            .get(&StockKey::new(product_id, option_id))
            .copied()
    }

    /// Makes every following `increase_stock` call fail.
    pub fn set_fail_on_increase(&self, fail: bool) {
        self.state().fail_on_increase = fail;
    }

    /// Recent successful increases, in call order.
    pub fn increases(&self) -> Vec<StockAdjustment> {
        self.state()
            .adjustments
            .iter()
            .filter(|a| a.delta > 0)
            .copied()
            .collect()
    }

    /// Recent successful adjustments, in call order.
    pub fn adjustments(&self) -> Vec<StockAdjustment> {
        self.state().adjustments.iter().copied().collect()
    }
}

#[async_trait]
impl InventoryAdjuster for InMemoryInventory {
    async fn decrease_stock(
        &self,
        product_id: ProductId,
        option_id: Option<ProductOptionId>,
        quantity: u32,
    ) -> Result<(), InventoryError> {
        let key = StockKey::new(product_id, option_id);
        let mut state = self.state();

        let available = state
            .stock
            .get_mut(&key)
            .ok_or(InventoryError::UnknownProduct { product_id })?;
        if *available < quantity {
            return Err(InventoryError::InsufficientStock {
                product_id,
                requested: quantity,
                available: *available,
            });
        }
        *available -= quantity;

        record_call(
            &mut state.adjustments,
            StockAdjustment {
                key,
                delta: -i64::from(quantity),
            },
        );
        Ok(())
    }

    async fn increase_stock(
        &self,
        product_id: ProductId,
        option_id: Option<ProductOptionId>,
        quantity: u32,
    ) -> Result<(), InventoryError> {
        let key = StockKey::new(product_id, option_id);
        let mut state = self.state();

        if state.fail_on_increase {
            return Err(InventoryError::Unavailable(
                "stock service is not responding".to_string(),
            ));
        }

        let available = state
            .stock
            .get_mut(&key)
            .ok_or(InventoryError::UnknownProduct { product_id })?;
        *available = available
            .checked_add(quantity)
            .ok_or(InventoryError::StockOverflow {
                product_id,
                available: *available,
                quantity,
                max: u32::MAX,
            })?;

        record_call(
            &mut state.adjustments,
            StockAdjustment {
                key,
                delta: i64::from(quantity),
            },
        );
        Ok(())
    }
}
