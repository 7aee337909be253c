//! Order endpoints: placement, lookup, lifecycle transitions and cancellation.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{MemberCouponId, MemberId, OrderId, OrderItemId, Page, ProductId, ProductOptionId};
use domain::{
    Money, Order, OrderItem, OrderItemStatus, OrderSearchCondition, OrderStatus, PaymentMethod,
    ShippingAddress,
};
use serde::{Deserialize, Serialize};
use store::{EventEnvelope, Store};
use workflow::CreateOrderRequest;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{Caller, PageParams, parse_uuid};

// -- Request types --

#[derive(Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

impl CancelRequest {
    fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or("Cancelled by customer")
    }
}

#[derive(Deserialize)]
pub struct PayRequest {
    pub payment_method: PaymentMethod,
    pub transaction_id: String,
}

#[derive(Deserialize)]
pub struct ShipRequest {
    pub tracking_number: String,
}

/// Query string of `GET /admin/orders`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub member_id: Option<MemberId>,
    pub status: Option<OrderStatus>,
    pub order_number: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub order_number: String,
    pub member_id: MemberId,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub shipping_address: ShippingAddress,
    pub full_address: String,
    pub subtotal: Money,
    pub shipping_fee: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub member_coupon_id: Option<MemberCouponId>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_transaction_id: Option<String>,
    pub tracking_number: Option<String>,
    pub cancel_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_option_id: Option<ProductOptionId>,
    pub product_name: String,
    pub option_name: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
    pub status: OrderItemStatus,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id(),
            product_id: item.product_id(),
            product_option_id: item.product_option_id(),
            product_name: item.product_name().to_string(),
            option_name: item.option_name().map(String::from),
            unit_price: item.unit_price(),
            quantity: item.quantity(),
            subtotal: item.subtotal(),
            status: item.status(),
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id(),
            order_number: order.order_number().to_string(),
            member_id: order.member_id(),
            status: order.status(),
            items: order.items().iter().map(OrderItemResponse::from).collect(),
            shipping_address: order.shipping_address().clone(),
            full_address: order.full_address(),
            subtotal: order.subtotal(),
            shipping_fee: order.shipping_fee(),
            discount_amount: order.discount_amount(),
            total_amount: order.total_amount(),
            member_coupon_id: order.member_coupon_id(),
            payment_method: order.payment_method(),
            payment_transaction_id: order.payment_transaction_id().map(String::from),
            tracking_number: order.tracking_number().map(String::from),
            cancel_reason: order.cancel_reason().map(String::from),
            paid_at: order.paid_at(),
            shipped_at: order.shipped_at(),
            delivered_at: order.delivered_at(),
            cancelled_at: order.cancelled_at(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

/// Response type for event envelope data.
#[derive(Serialize)]
pub struct EventEnvelopeResponse {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub version: i64,
    pub timestamp: String,
    pub payload: serde_json::Value,
}

impl From<EventEnvelope> for EventEnvelopeResponse {
    fn from(e: EventEnvelope) -> Self {
        Self {
            event_id: e.event_id.to_string(),
            event_type: e.event_type,
            aggregate_id: e.aggregate_id.to_string(),
            version: e.version.as_i64(),
            timestamp: e.timestamp.to_rfc3339(),
            payload: e.payload,
        }
    }
}

// -- Handlers --

/// POST /orders: place an order for the caller.
#[tracing::instrument(skip(state, caller, req))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state.orders.create_order(caller.member_id(), req).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders: the caller's orders, newest first.
#[tracing::instrument(skip(state, caller))]
pub async fn list_mine<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<OrderResponse>>, ApiError> {
    let page = state
        .orders
        .get_my_orders(caller.member_id(), params.to_request()?)
        .await?;
    Ok(Json(page.map(OrderResponse::from)))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state, caller))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.get_order(parse_order_id(&id)?, caller.0).await?;
    Ok(Json(order.into()))
}

/// GET /orders/number/{order_number}
#[tracing::instrument(skip(state, caller))]
pub async fn get_by_number<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .orders
        .get_order_by_number(&order_number, caller.0)
        .await?;
    Ok(Json(order.into()))
}

/// GET /orders/{id}/events: the order's domain events, oldest first.
#[tracing::instrument(skip(state, caller))]
pub async fn events<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventEnvelopeResponse>>, ApiError> {
    let envelopes = state
        .orders
        .get_order_history(parse_order_id(&id)?, caller.0)
        .await?;
    Ok(Json(envelopes.into_iter().map(Into::into).collect()))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, caller, req))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .orders
        .cancel_order(parse_order_id(&id)?, caller.member_id(), req.reason())
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/items/{item_id}/cancel
#[tracing::instrument(skip(state, caller, req))]
pub async fn cancel_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path((id, item_id)): Path<(String, String)>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let item_id = OrderItemId::from_uuid(parse_uuid(&item_id)?);
    let order = state
        .orders
        .cancel_order_item(parse_order_id(&id)?, caller.member_id(), item_id, req.reason())
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/pay (admin): record an out-of-band payment.
#[tracing::instrument(skip(state, caller, req))]
pub async fn pay<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<PayRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    caller.require_admin()?;
    let order = state
        .orders
        .process_payment(parse_order_id(&id)?, req.payment_method, &req.transaction_id)
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/prepare (admin)
#[tracing::instrument(skip(state, caller))]
pub async fn prepare<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    caller.require_admin()?;
    let order = state.orders.start_preparing(parse_order_id(&id)?).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/ship (admin)
#[tracing::instrument(skip(state, caller, req))]
pub async fn ship<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<ShipRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    caller.require_admin()?;
    let order = state
        .orders
        .ship_order(parse_order_id(&id)?, &req.tracking_number)
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/deliver (admin)
#[tracing::instrument(skip(state, caller))]
pub async fn deliver<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    caller.require_admin()?;
    let order = state.orders.deliver_order(parse_order_id(&id)?).await?;
    Ok(Json(order.into()))
}

/// GET /admin/orders (admin): search across all members.
#[tracing::instrument(skip(state, caller))]
pub async fn search<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Query(params): Query<SearchParams>,
) -> Result<Json<Page<OrderResponse>>, ApiError> {
    caller.require_admin()?;
    let page = PageParams {
        page: params.page,
        size: params.size,
    }
    .to_request()?;
    let condition = OrderSearchCondition {
        member_id: params.member_id,
        status: params.status,
        order_number: params.order_number,
        start_date: params.start_date,
        end_date: params.end_date,
    };
    let found = state.orders.search_orders(&condition, page).await?;
    Ok(Json(found.map(OrderResponse::from)))
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    parse_uuid(id).map(OrderId::from_uuid)
}
