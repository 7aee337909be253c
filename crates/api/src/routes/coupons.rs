//! Coupon administration, issuance and pricing endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CouponId, MemberCouponId, MemberId, OrderId, Page};
use domain::{Coupon, CouponSearchCondition, CouponType, CouponUpdate, CreateCoupon, Money};
use serde::{Deserialize, Serialize};
use store::Store;
use workflow::{DiscountQuote, MemberCouponDetails};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{Caller, PageParams, parse_uuid};

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub active_only: bool,
    pub code: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AmountParams {
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
pub struct ValidateParams {
    pub code: String,
    pub amount: Money,
}

#[derive(Debug, Default, Deserialize)]
pub struct MyCouponsParams {
    #[serde(default)]
    pub available_only: bool,
}

#[derive(Deserialize)]
pub struct ApplyRequest {
    pub code: String,
    pub order_amount: Money,
}

// -- Response types --

#[derive(Serialize)]
pub struct CouponResponse {
    pub id: CouponId,
    pub code: String,
    pub name: String,
    pub coupon_type: CouponType,
    pub discount_value: i64,
    pub minimum_order: Money,
    pub maximum_discount: Option<Money>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub total_quantity: u32,
    pub used_quantity: u32,
    pub remaining_quantity: u32,
    pub active: bool,
    pub valid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Coupon> for CouponResponse {
    fn from(coupon: Coupon) -> Self {
        Self {
            id: coupon.id(),
            code: coupon.code().to_string(),
            name: coupon.name().to_string(),
            coupon_type: coupon.coupon_type(),
            discount_value: coupon.discount_value(),
            minimum_order: coupon.minimum_order(),
            maximum_discount: coupon.maximum_discount(),
            valid_from: coupon.valid_from(),
            valid_to: coupon.valid_to(),
            total_quantity: coupon.total_quantity(),
            used_quantity: coupon.used_quantity(),
            remaining_quantity: coupon.remaining_quantity(),
            active: coupon.is_active(),
            valid: coupon.is_valid(),
            created_at: coupon.created_at(),
            updated_at: coupon.updated_at(),
        }
    }
}

#[derive(Serialize)]
pub struct MemberCouponResponse {
    pub id: MemberCouponId,
    pub member_id: MemberId,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub order_id: Option<OrderId>,
    pub issued_at: DateTime<Utc>,
    pub available: bool,
    pub coupon: CouponResponse,
}

impl From<MemberCouponDetails> for MemberCouponResponse {
    fn from(details: MemberCouponDetails) -> Self {
        let member_coupon = details.member_coupon;
        Self {
            id: member_coupon.id(),
            member_id: member_coupon.member_id(),
            used: member_coupon.is_used(),
            used_at: member_coupon.used_at(),
            order_id: member_coupon.order_id(),
            issued_at: member_coupon.issued_at(),
            available: details.available,
            coupon: details.coupon.into(),
        }
    }
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub code: String,
    pub valid: bool,
}

// -- Handlers --

/// POST /coupons (admin)
#[tracing::instrument(skip(state, caller, req))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<CreateCoupon>,
) -> Result<(StatusCode, Json<CouponResponse>), ApiError> {
    caller.require_admin()?;
    let coupon = state.coupons.create_coupon(req).await?;
    Ok((StatusCode::CREATED, Json(coupon.into())))
}

/// GET /coupons?active_only=&code=&page=&size=
#[tracing::instrument(skip(state))]
pub async fn search<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Page<CouponResponse>>, ApiError> {
    let page = PageParams {
        page: params.page,
        size: params.size,
    }
    .to_request()?;
    let condition = CouponSearchCondition {
        active_only: params.active_only,
        code_contains: params.code,
    };
    let found = state.coupons.search_coupons(&condition, page).await?;
    Ok(Json(found.map(CouponResponse::from)))
}

/// GET /coupons/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CouponResponse>, ApiError> {
    let coupon = state.coupons.get_coupon(parse_coupon_id(&id)?).await?;
    Ok(Json(coupon.into()))
}

/// GET /coupons/code/{code}
#[tracing::instrument(skip(state))]
pub async fn get_by_code<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(code): Path<String>,
) -> Result<Json<CouponResponse>, ApiError> {
    let coupon = state.coupons.get_coupon_by_code(&code).await?;
    Ok(Json(coupon.into()))
}

/// PATCH /coupons/{id} (admin)
#[tracing::instrument(skip(state, caller, req))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<CouponUpdate>,
) -> Result<Json<CouponResponse>, ApiError> {
    caller.require_admin()?;
    let coupon = state
        .coupons
        .update_coupon(parse_coupon_id(&id)?, req)
        .await?;
    Ok(Json(coupon.into()))
}

/// POST /coupons/{id}/activate (admin)
#[tracing::instrument(skip(state, caller))]
pub async fn activate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<CouponResponse>, ApiError> {
    caller.require_admin()?;
    let coupon = state.coupons.activate_coupon(parse_coupon_id(&id)?).await?;
    Ok(Json(coupon.into()))
}

/// POST /coupons/{id}/deactivate (admin)
#[tracing::instrument(skip(state, caller))]
pub async fn deactivate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<CouponResponse>, ApiError> {
    caller.require_admin()?;
    let coupon = state
        .coupons
        .deactivate_coupon(parse_coupon_id(&id)?)
        .await?;
    Ok(Json(coupon.into()))
}

/// DELETE /coupons/{id} (admin): soft delete.
#[tracing::instrument(skip(state, caller))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require_admin()?;
    state.coupons.delete_coupon(parse_coupon_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /coupons/{id}/issue: issue the coupon to the caller.
#[tracing::instrument(skip(state, caller))]
pub async fn issue<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<MemberCouponResponse>), ApiError> {
    let coupon_id = parse_coupon_id(&id)?;
    let member_coupon = state
        .coupons
        .issue_coupon(coupon_id, caller.member_id())
        .await?;
    let coupon = state.coupons.get_coupon(coupon_id).await?;
    let details = MemberCouponDetails {
        available: member_coupon.is_available(&coupon, Utc::now()),
        member_coupon,
        coupon,
    };
    Ok((StatusCode::CREATED, Json(details.into())))
}

/// POST /coupons/code/{code}/issue: issue by code to the caller.
#[tracing::instrument(skip(state, caller))]
pub async fn issue_by_code<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(code): Path<String>,
) -> Result<(StatusCode, Json<MemberCouponResponse>), ApiError> {
    let member_coupon = state
        .coupons
        .issue_coupon_by_code(&code, caller.member_id())
        .await?;
    let coupon = state.coupons.get_coupon(member_coupon.coupon_id()).await?;
    let details = MemberCouponDetails {
        available: member_coupon.is_available(&coupon, Utc::now()),
        member_coupon,
        coupon,
    };
    Ok((StatusCode::CREATED, Json(details.into())))
}

/// GET /coupons/{id}/calculate?amount=
#[tracing::instrument(skip(state))]
pub async fn calculate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(params): Query<AmountParams>,
) -> Result<Json<DiscountQuote>, ApiError> {
    let quote = state
        .coupons
        .calculate_discount(parse_coupon_id(&id)?, params.amount)
        .await?;
    Ok(Json(quote))
}

/// POST /coupons/apply
#[tracing::instrument(skip(state, req))]
pub async fn apply<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ApplyRequest>,
) -> Result<Json<DiscountQuote>, ApiError> {
    let quote = state
        .coupons
        .apply_coupon(&req.code, req.order_amount)
        .await?;
    Ok(Json(quote))
}

/// GET /coupons/validate?code=&amount=
#[tracing::instrument(skip(state))]
pub async fn validate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ValidateParams>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let valid = state
        .coupons
        .validate_coupon(&params.code, params.amount)
        .await?;
    Ok(Json(ValidateResponse {
        code: params.code,
        valid,
    }))
}

/// GET /members/me/coupons?available_only=
#[tracing::instrument(skip(state, caller))]
pub async fn my_coupons<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Query(params): Query<MyCouponsParams>,
) -> Result<Json<Vec<MemberCouponResponse>>, ApiError> {
    let coupons = state
        .coupons
        .get_member_coupons(caller.member_id(), params.available_only)
        .await?;
    Ok(Json(coupons.into_iter().map(Into::into).collect()))
}

/// GET /members/me/coupons/for-order?amount=: usable coupons, best discount first.
#[tracing::instrument(skip(state, caller))]
pub async fn my_coupons_for_order<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Query(params): Query<AmountParams>,
) -> Result<Json<Vec<MemberCouponResponse>>, ApiError> {
    let coupons = state
        .coupons
        .get_available_coupons_for_order(caller.member_id(), params.amount)
        .await?;
    Ok(Json(coupons.into_iter().map(Into::into).collect()))
}

fn parse_coupon_id(id: &str) -> Result<CouponId, ApiError> {
    parse_uuid(id).map(CouponId::from_uuid)
}
