//! Order command payloads.

use common::{MemberCouponId, MemberId, OrderId, ProductId, ProductOptionId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

use super::{OrderError, OrderItem, ShippingAddress};

/// Places a new order header. Items are appended afterwards with [`AddItem`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub member_id: MemberId,
    pub shipping_address: ShippingAddress,
    /// Defaults to zero when unset.
    pub shipping_fee: Option<Money>,
    /// Defaults to zero when unset.
    pub discount_amount: Option<Money>,
    pub member_coupon_id: Option<MemberCouponId>,
}

impl CreateOrder {
    /// Creates a command with a fresh order id and no fee or discount.
    pub fn new(member_id: MemberId, shipping_address: ShippingAddress) -> Self {
        Self {
            order_id: OrderId::new(),
            member_id,
            shipping_address,
            shipping_fee: None,
            discount_amount: None,
            member_coupon_id: None,
        }
    }

    pub fn with_shipping_fee(mut self, fee: Money) -> Self {
        self.shipping_fee = Some(fee);
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount_amount = Some(discount);
        self
    }

    pub fn with_member_coupon(mut self, member_coupon_id: MemberCouponId, discount: Money) -> Self {
        self.member_coupon_id = Some(member_coupon_id);
        self.discount_amount = Some(discount);
        self
    }
}

/// Appends a line to an order, snapshotting catalog data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    pub product_id: ProductId,
    pub product_option_id: Option<ProductOptionId>,
    pub product_name: String,
    pub option_name: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
}

impl AddItem {
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id,
            product_option_id: None,
            product_name: product_name.into(),
            option_name: None,
            unit_price,
            quantity,
        }
    }

    pub fn with_option(mut self, option_id: ProductOptionId, option_name: impl Into<String>) -> Self {
        self.product_option_id = Some(option_id);
        self.option_name = Some(option_name.into());
        self
    }

    /// Returns unit price times quantity without building an item.
    pub fn subtotal(&self) -> Result<Money, OrderError> {
        self.unit_price
            .checked_mul(self.quantity)
            .ok_or(OrderError::AmountOverflow)
    }

    /// Validates the line and builds the order item.
    pub fn to_item(&self) -> Result<OrderItem, OrderError> {
        OrderItem::new(
            self.product_id,
            self.product_option_id,
            self.product_name.clone(),
            self.option_name.clone(),
            self.unit_price,
            self.quantity,
        )
    }
}
