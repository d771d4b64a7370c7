use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::money::{ensure_digits, quantize, AMOUNT_DIGITS, QUANTITY_DIGITS};
use crate::pricing::{line_total, DiscountRule};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemId(pub i64);

/// Which catalog table a line references. Quotation and work-order lines come
/// in both flavours and share every other rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Service,
    Part,
}

impl LineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Part => "part",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub kind: LineKind,
    /// Id of the referenced `Service` or `Part`, depending on `kind`.
    pub catalog_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
}

impl LineItem {
    /// Stored-total contribution: `quantity * unit_price - discount`.
    pub fn raw_total(&self) -> Decimal {
        line_total(DiscountRule::Subtractive, self.quantity, self.unit_price, self.discount)
    }

    /// Read-side total where a discount of at most 1 is a fraction of the unit price.
    pub fn line_total(&self) -> Decimal {
        line_total(DiscountRule::Hybrid, self.quantity, self.unit_price, self.discount)
    }
}

fn default_quantity() -> Decimal {
    Decimal::ONE
}

/// Client-supplied line values prior to validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemInput {
    #[serde(default)]
    pub id: Option<LineItemId>,
    /// Sent as `service` or `part` by API clients.
    #[serde(alias = "service", alias = "part")]
    pub catalog_id: i64,
    #[serde(default = "default_quantity")]
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
}

/// Validated, quantized values ready to persist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedLine {
    pub id: Option<LineItemId>,
    pub kind: LineKind,
    pub catalog_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
}

impl LineItemInput {
    pub fn prepare(self, kind: LineKind) -> Result<PreparedLine, DomainError> {
        ensure_digits("quantity", self.quantity, QUANTITY_DIGITS)?;
        ensure_digits("unit_price", self.unit_price, AMOUNT_DIGITS)?;
        ensure_digits("discount", self.discount, AMOUNT_DIGITS)?;
        validate_amounts(self.quantity, self.unit_price, self.discount)?;

        let quantity = quantize(self.quantity);
        let unit_price = quantize(self.unit_price);
        let discount = quantize(self.discount);
        // Rounding can turn 0.004 into 0.00 or push the discount past the
        // subtotal, so the stored values are checked again.
        validate_amounts(quantity, unit_price, discount)?;

        Ok(PreparedLine { id: self.id, kind, catalog_id: self.catalog_id, quantity, unit_price, discount })
    }
}

pub fn validate_amounts(
    quantity: Decimal,
    unit_price: Decimal,
    discount: Decimal,
) -> Result<(), DomainError> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation("quantity", "must be greater than 0"));
    }
    if unit_price < Decimal::ZERO {
        return Err(DomainError::validation("unit_price", "must be greater than or equal to 0"));
    }
    if discount < Decimal::ZERO {
        return Err(DomainError::validation("discount", "must be greater than or equal to 0"));
    }
    let Some(subtotal) = quantity.checked_mul(unit_price) else {
        return Err(DomainError::validation("quantity", "line subtotal is out of range"));
    };
    if discount > subtotal {
        return Err(DomainError::validation(
            "discount",
            "cannot exceed the line subtotal (quantity x unit price)",
        ));
    }
    Ok(())
}
