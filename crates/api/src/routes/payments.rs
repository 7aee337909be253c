//! Payment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use domain::{Money, Payment, PaymentMethod, PaymentStatus};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{Caller, parse_uuid};
use crate::routes::orders::parse_order_id;

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub payment_method: PaymentMethod,
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub transaction_id: String,
    pub amount: Money,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub transaction_id: String,
    pub pg_transaction_id: Option<String>,
    pub payment_method: PaymentMethod,
    pub amount: Money,
    pub status: PaymentStatus,
    pub fail_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id(),
            order_id: payment.order_id(),
            transaction_id: payment.transaction_id().to_string(),
            pg_transaction_id: payment.pg_transaction_id().map(String::from),
            payment_method: payment.method(),
            amount: payment.amount(),
            status: payment.status(),
            fail_reason: payment.fail_reason().map(String::from),
            paid_at: payment.paid_at(),
            cancelled_at: payment.cancelled_at(),
            created_at: payment.created_at(),
        }
    }
}

/// POST /payments: open a payment for one of the caller's orders.
#[tracing::instrument(skip(state, caller, req))]
pub async fn request<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let payment = state
        .payments
        .request_payment(req.order_id, req.payment_method, caller.0)
        .await?;
    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// POST /payments/confirm: confirm with the gateway.
///
/// A declined card is a `200` with status `FAILED`, not an error.
#[tracing::instrument(skip(state, req))]
pub async fn confirm<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state
        .payments
        .confirm_payment(&req.transaction_id, req.amount)
        .await?;
    Ok(Json(payment.into()))
}

/// GET /payments/{id}
#[tracing::instrument(skip(state, caller))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state
        .payments
        .get_payment(parse_payment_id(&id)?, caller.0)
        .await?;
    Ok(Json(payment.into()))
}

/// POST /payments/{id}/cancel: refund through the gateway.
#[tracing::instrument(skip(state, caller))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state
        .payments
        .cancel_payment(parse_payment_id(&id)?, caller.0)
        .await?;
    Ok(Json(payment.into()))
}

/// GET /orders/{id}/payments: newest first.
#[tracing::instrument(skip(state, caller))]
pub async fn list_for_order<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    let payments = state
        .payments
        .get_payments_by_order(parse_order_id(&id)?, caller.0)
        .await?;
    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

fn parse_payment_id(id: &str) -> Result<PaymentId, ApiError> {
    parse_uuid(id).map(PaymentId::from_uuid)
}
