//! Value objects for the order domain.

use common::{OrderItemId, ProductId, ProductOptionId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

use super::{OrderError, OrderItemStatus};

/// Delivery address copied onto the order when it is placed.
///
/// Later edits to the member's address book never reach existing orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient_name: String,
    pub recipient_phone: String,
    pub zip_code: String,
    pub address: String,
    pub address_detail: Option<String>,
}

impl ShippingAddress {
    pub fn new(
        recipient_name: impl Into<String>,
        recipient_phone: impl Into<String>,
        zip_code: impl Into<String>,
        address: impl Into<String>,
        address_detail: Option<String>,
    ) -> Self {
        Self {
            recipient_name: recipient_name.into(),
            recipient_phone: recipient_phone.into(),
            zip_code: zip_code.into(),
            address: address.into(),
            address_detail,
        }
    }

    /// Checks that every mandatory field is filled in.
    pub fn validate(&self) -> Result<(), OrderError> {
        let required = [
            ("recipient_name", &self.recipient_name),
            ("recipient_phone", &self.recipient_phone),
            ("zip_code", &self.zip_code),
            ("address", &self.address),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(OrderError::AddressFieldRequired { field });
            }
        }
        Ok(())
    }

    /// Formats the address as `(zip) address detail`.
    pub fn full_address(&self) -> String {
        match self.address_detail.as_deref() {
            Some(detail) if !detail.is_empty() => {
                format!("({}) {} {}", self.zip_code, self.address, detail)
            }
            _ => format!("({}) {}", self.zip_code, self.address),
        }
    }
}

/// A line of an order.
///
/// Product name, option name and unit price are snapshots taken when the
/// order was placed; they are never re-read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    id: OrderItemId,
    product_id: ProductId,
    product_option_id: Option<ProductOptionId>,
    product_name: String,
    option_name: Option<String>,
    unit_price: Money,
    quantity: u32,
    status: OrderItemStatus,
}

impl OrderItem {
    /// Creates a new order line, rejecting zero quantity, negative price and
    /// a line total that does not fit in `Money`.
    pub fn new(
        product_id: ProductId,
        product_option_id: Option<ProductOptionId>,
        product_name: impl Into<String>,
        option_name: Option<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Result<Self, OrderError> {
        if quantity == 0 {
            return Err(OrderError::InvalidQuantity);
        }
        if unit_price.is_negative() {
            return Err(OrderError::NegativePrice { price: unit_price });
        }
        unit_price
            .checked_mul(quantity)
            .ok_or(OrderError::AmountOverflow)?;

        Ok(Self {
            id: OrderItemId::new(),
            product_id,
            product_option_id,
            product_name: product_name.into(),
            option_name,
            unit_price,
            quantity,
            status: OrderItemStatus::Ordered,
        })
    }

    pub fn id(&self) -> OrderItemId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn product_option_id(&self) -> Option<ProductOptionId> {
        self.product_option_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn option_name(&self) -> Option<&str> {
        self.option_name.as_deref()
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn status(&self) -> OrderItemStatus {
        self.status
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == OrderItemStatus::Cancelled
    }

    /// Returns unit price times quantity.
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    pub(crate) fn set_status(&mut self, status: OrderItemStatus) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn address() -> ShippingAddress {
        ShippingAddress::new(
            "Kim Minsu",
            "010-1234-5678",
            "06236",
            "Teheran-ro 152",
            Some("12F".to_string()),
        )
    }

    #[test]
    fn test_full_address_with_detail() {
        assert_eq!(address().full_address(), "(06236) Teheran-ro 152 12F");
    }

    #[test]
    fn test_full_address_without_detail() {
        let mut addr = address();
        addr.address_detail = None;
        assert_eq!(addr.full_address(), "(06236) Teheran-ro 152");
    }

    #[test]
    fn test_blank_recipient_is_rejected() {
        let mut addr = address();
        addr.recipient_name = "  ".to_string();
        assert!(matches!(
            addr.validate(),
            Err(OrderError::AddressFieldRequired {
                field: "recipient_name"
            })
        ));
    }

    #[test]
    fn test_item_subtotal() {
        let item =
            OrderItem::new(ProductId::new(), None, "Hoodie", None, Money::new(29000), 2).unwrap();
        assert_eq!(item.subtotal(), Money::new(58000));
        assert_eq!(item.status(), OrderItemStatus::Ordered);
    }

    #[test]
    fn test_item_rejects_zero_quantity() {
        let result = OrderItem::new(ProductId::new(), None, "Hoodie", None, Money::new(1000), 0);
        assert!(matches!(result, Err(OrderError::InvalidQuantity)));
    }

    #[test]
    fn test_item_rejects_negative_price() {
        let result = OrderItem::new(ProductId::new(), None, "Hoodie", None, Money::new(-1), 1);
        assert!(matches!(result, Err(OrderError::NegativePrice { .. })));
    }

    #[test]
    fn test_item_rejects_line_total_overflow() {
        let price = Money::new(i64::MAX / 2 + 1);
        let result = OrderItem::new(ProductId::new(), None, "Gold bar", None, price, 2);
        assert!(matches!(result, Err(OrderError::AmountOverflow)));
        assert_eq!(OrderError::AmountOverflow.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_item_allows_free_price() {
        let item = OrderItem::new(ProductId::new(), None, "Sticker", None, Money::zero(), 1);
        assert!(item.is_ok());
    }
}
