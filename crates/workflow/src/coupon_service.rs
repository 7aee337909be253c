//! Coupon administration, issuance and redemption.

use chrono::Utc;
use common::{CouponId, MemberCouponId, MemberId, OrderId, Page, PageRequest};
use domain::{
    Aggregate, Coupon, CouponError, CouponSearchCondition, CouponUpdate, CreateCoupon,
    MemberCoupon, Money,
};
use serde::Serialize;
use store::{Store, error::constraints};

use crate::error::{Result, WorkflowError};

/// Outcome of pricing an amount with a coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscountQuote {
    pub coupon_id: CouponId,
    pub code: String,
    pub order_amount: Money,
    pub applicable: bool,
    pub discount: Money,
    pub final_amount: Money,
    /// Why the coupon does not apply.
    pub message: Option<String>,
}

/// A member's coupon together with the rules behind it.
#[derive(Debug, Clone, Serialize)]
pub struct MemberCouponDetails {
    pub member_coupon: MemberCoupon,
    pub coupon: Coupon,
    pub available: bool,
}

pub struct CouponService<S: Store> {
    store: S,
}

impl<S: Store> Clone for CouponService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> CouponService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn load_coupon(&self, coupon_id: CouponId) -> Result<Coupon> {
        self.store
            .find_coupon(coupon_id)
            .await?
            .filter(|c| !c.is_deleted())
            .ok_or_else(|| WorkflowError::CouponNotFound(coupon_id.to_string()))
    }

    async fn load_coupon_by_code(&self, code: &str) -> Result<Coupon> {
        self.store
            .find_coupon_by_code(code)
            .await?
            .filter(|c| !c.is_deleted())
            .ok_or_else(|| WorkflowError::CouponNotFound(code.trim().to_uppercase()))
    }

    /// Loads a member coupon and its coupon, deleted or not.
    pub(crate) async fn load_member_coupon(
        &self,
        member_coupon_id: MemberCouponId,
    ) -> Result<(MemberCoupon, Coupon)> {
        let member_coupon = self
            .store
            .find_member_coupon(member_coupon_id)
            .await?
            .ok_or_else(|| WorkflowError::MemberCouponNotFound(member_coupon_id.to_string()))?;
        let coupon = self
            .store
            .find_coupon(member_coupon.coupon_id())
            .await?
            .ok_or_else(|| WorkflowError::CouponNotFound(member_coupon.coupon_id().to_string()))?;
        Ok((member_coupon, coupon))
    }

    async fn save(&self, mut coupon: Coupon, events: Vec<domain::CouponEvent>) -> Result<Coupon> {
        let version = self.store.save_coupon(&coupon, &events).await?;
        coupon.set_version(version);
        Ok(coupon)
    }

    #[tracing::instrument(skip(self, cmd), fields(code = %cmd.code))]
    pub async fn create_coupon(&self, cmd: CreateCoupon) -> Result<Coupon> {
        let (coupon, events) = Coupon::create(cmd)?;

        // Deleted coupons keep their code reserved.
        if self.store.find_coupon_by_code(coupon.code()).await?.is_some() {
            return Err(WorkflowError::DuplicateCouponCode);
        }

        let coupon = self.save(coupon, events).await.map_err(|e| match e {
            WorkflowError::Store(ref s) if s.is_duplicate(constraints::COUPON_CODE) => {
                WorkflowError::DuplicateCouponCode
            }
            other => other,
        })?;

        tracing::info!(coupon_id = %coupon.id(), code = coupon.code(), "coupon created");
        Ok(coupon)
    }

    pub async fn get_coupon(&self, coupon_id: CouponId) -> Result<Coupon> {
        self.load_coupon(coupon_id).await
    }

    pub async fn get_coupon_by_code(&self, code: &str) -> Result<Coupon> {
        self.load_coupon_by_code(code).await
    }

    pub async fn search_coupons(
        &self,
        condition: &CouponSearchCondition,
        page: PageRequest,
    ) -> Result<Page<Coupon>> {
        Ok(self.store.search_coupons(condition, page).await?)
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update_coupon(&self, coupon_id: CouponId, update: CouponUpdate) -> Result<Coupon> {
        let mut coupon = self.load_coupon(coupon_id).await?;
        let events = coupon.execute(|c| c.update(update))?;
        self.save(coupon, events).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn activate_coupon(&self, coupon_id: CouponId) -> Result<Coupon> {
        let mut coupon = self.load_coupon(coupon_id).await?;
        let events = coupon.execute(|c| c.activate())?;
        self.save(coupon, events).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn deactivate_coupon(&self, coupon_id: CouponId) -> Result<Coupon> {
        let mut coupon = self.load_coupon(coupon_id).await?;
        let events = coupon.execute(|c| c.deactivate())?;
        self.save(coupon, events).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_coupon(&self, coupon_id: CouponId) -> Result<()> {
        let mut coupon = self.load_coupon(coupon_id).await?;
        let events = coupon.execute(|c| c.delete())?;
        self.save(coupon, events).await?;
        tracing::info!(%coupon_id, "coupon deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn issue_coupon(&self, coupon_id: CouponId, member_id: MemberId) -> Result<MemberCoupon> {
        let coupon = self.load_coupon(coupon_id).await?;
        self.issue(&coupon, member_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn issue_coupon_by_code(&self, code: &str, member_id: MemberId) -> Result<MemberCoupon> {
        let coupon = self.load_coupon_by_code(code).await?;
        self.issue(&coupon, member_id).await
    }

    async fn issue(&self, coupon: &Coupon, member_id: MemberId) -> Result<MemberCoupon> {
        if self
            .store
            .find_member_coupon_by_member_and_coupon(member_id, coupon.id())
            .await?
            .is_some()
        {
            return Err(WorkflowError::CouponAlreadyIssued);
        }

        let (mut member_coupon, events) = MemberCoupon::issue(member_id, coupon)?;
        let version = self
            .store
            .save_member_coupon(&member_coupon, &events)
            .await
            .map_err(|e| {
                if e.is_duplicate(constraints::MEMBER_COUPON) {
                    WorkflowError::CouponAlreadyIssued
                } else {
                    WorkflowError::from(e)
                }
            })?;
        member_coupon.set_version(version);

        metrics::counter!("coupons_issued_total").increment(1);
        tracing::info!(
            member_coupon_id = %member_coupon.id(),
            coupon_id = %coupon.id(),
            %member_id,
            "coupon issued"
        );
        Ok(member_coupon)
    }

    /// Coupons held by `member_id`, newest issuance first.
    pub async fn get_member_coupons(
        &self,
        member_id: MemberId,
        available_only: bool,
    ) -> Result<Vec<MemberCouponDetails>> {
        let now = Utc::now();
        let mut details = Vec::new();

        for member_coupon in self.store.find_member_coupons(member_id).await? {
            let Some(coupon) = self.store.find_coupon(member_coupon.coupon_id()).await? else {
                continue;
            };
            let available = member_coupon.is_available(&coupon, now);
            if available_only && !available {
                continue;
            }
            details.push(MemberCouponDetails {
                member_coupon,
                coupon,
                available,
            });
        }
        Ok(details)
    }

    /// Usable coupons for an order of `order_amount`, best discount first.
    pub async fn get_available_coupons_for_order(
        &self,
        member_id: MemberId,
        order_amount: Money,
    ) -> Result<Vec<MemberCouponDetails>> {
        let now = Utc::now();
        let mut details: Vec<_> = self
            .get_member_coupons(member_id, true)
            .await?
            .into_iter()
            .filter(|d| d.coupon.is_applicable_at(order_amount, now))
            .collect();

        details.sort_by_key(|d| std::cmp::Reverse(d.coupon.calculate_discount(order_amount)));
        Ok(details)
    }

    pub async fn calculate_discount(
        &self,
        coupon_id: CouponId,
        order_amount: Money,
    ) -> Result<DiscountQuote> {
        let coupon = self.load_coupon(coupon_id).await?;
        Ok(quote(&coupon, order_amount))
    }

    /// Prices `order_amount` with the coupon behind `code`.
    pub async fn apply_coupon(&self, code: &str, order_amount: Money) -> Result<DiscountQuote> {
        let coupon = self.load_coupon_by_code(code).await?;
        let quote = quote(&coupon, order_amount);
        if !quote.applicable {
            return Err(CouponError::NotApplicable.into());
        }
        Ok(quote)
    }

    /// Whether `code` can be used on `order_amount`. Unknown codes are not valid.
    pub async fn validate_coupon(&self, code: &str, order_amount: Money) -> Result<bool> {
        match self.load_coupon_by_code(code).await {
            Ok(coupon) => Ok(coupon.is_applicable(order_amount)),
            Err(WorkflowError::CouponNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Spends a member coupon on an order and consumes one unit of the coupon.
    #[tracing::instrument(skip(self))]
    pub async fn use_coupon(
        &self,
        member_coupon_id: MemberCouponId,
        order_id: OrderId,
    ) -> Result<MemberCoupon> {
        let (mut member_coupon, mut coupon) = self.load_member_coupon(member_coupon_id).await?;
        let now = Utc::now();

        let member_events = member_coupon.execute(|m| m.use_for(&coupon, order_id, now))?;
        let coupon_events = coupon.execute(|c| c.use_one())?;

        let (_, version) = self
            .store
            .save_redemption(&coupon, &coupon_events, &member_coupon, &member_events)
            .await?;
        member_coupon.set_version(version);

        metrics::counter!("coupons_redeemed_total").increment(1);
        tracing::info!(%member_coupon_id, %order_id, "coupon redeemed");
        Ok(member_coupon)
    }

    /// Gives a used member coupon back. A no-op for unused coupons.
    #[tracing::instrument(skip(self))]
    pub async fn restore_coupon(&self, member_coupon_id: MemberCouponId) -> Result<MemberCoupon> {
        let (mut member_coupon, mut coupon) = self.load_member_coupon(member_coupon_id).await?;

        let member_events = member_coupon.restore();
        if member_events.is_empty() {
            return Ok(member_coupon);
        }
        member_coupon.apply_events(member_events.clone());
        let coupon_events = coupon.restore_quantity();
        coupon.apply_events(coupon_events.clone());

        let (_, version) = self
            .store
            .save_redemption(&coupon, &coupon_events, &member_coupon, &member_events)
            .await?;
        member_coupon.set_version(version);

        metrics::counter!("coupons_restored_total").increment(1);
        tracing::info!(%member_coupon_id, "coupon restored");
        Ok(member_coupon)
    }
}

fn quote(coupon: &Coupon, order_amount: Money) -> DiscountQuote {
    let message = if !coupon.is_valid() {
        Some("Coupon is not valid".to_string())
    } else if !coupon.is_applicable(order_amount) {
        Some("Order amount does not meet minimum requirement".to_string())
    } else {
        None
    };

    let applicable = message.is_none();
    let discount = if applicable {
        coupon.calculate_discount(order_amount)
    } else {
        Money::zero()
    };

    DiscountQuote {
        coupon_id: coupon.id(),
        code: coupon.code().to_string(),
        order_amount,
        applicable,
        discount,
        final_amount: order_amount - discount,
        message,
    }
}
