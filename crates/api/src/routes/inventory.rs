//! Stock seeding for the in-memory inventory.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::{ProductId, ProductOptionId};
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::Caller;

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub product_option_id: Option<ProductOptionId>,
    pub quantity: u32,
}

/// PUT /admin/stock (admin)
#[tracing::instrument(skip(state, caller))]
pub async fn set_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<SetStockRequest>,
) -> Result<StatusCode, ApiError> {
    caller.require_admin()?;
    state
        .inventory
        .set_stock(req.product_id, req.product_option_id, req.quantity);
    tracing::info!(product_id = %req.product_id, quantity = req.quantity, "stock set");
    Ok(StatusCode::NO_CONTENT)
}
