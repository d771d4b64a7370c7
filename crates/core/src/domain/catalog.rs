//! Reference data priced onto quotation and work-order lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::money::{ensure_digits, quantize, AMOUNT_DIGITS, QUANTITY_DIGITS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub code: String,
    pub name: String,
    pub description: String,
    pub labor_minutes: u32,
    pub price: Decimal,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub stock: Decimal,
    pub cost: Decimal,
    pub price: Decimal,
    pub is_active: bool,
}

pub const DEFAULT_PART_UNIT: &str = "UNI";

fn default_active() -> bool {
    true
}

fn default_unit() -> String {
    DEFAULT_PART_UNIT.to_owned()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDraft {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labor_minutes: u32,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl ServiceDraft {
    pub fn prepare(mut self) -> Result<Self, DomainError> {
        self.code = self.code.trim().to_owned();
        require_text("code", &self.code)?;
        require_text("name", &self.name)?;
        self.price = non_negative("price", self.price)?;
        Ok(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDraft {
    pub sku: String,
    pub name: String,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub stock: Decimal,
    #[serde(default)]
    pub cost: Decimal,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl PartDraft {
    pub fn prepare(mut self) -> Result<Self, DomainError> {
        self.sku = self.sku.trim().to_owned();
        require_text("sku", &self.sku)?;
        require_text("name", &self.name)?;
        if self.unit.trim().is_empty() {
            self.unit = default_unit();
        }
        ensure_digits("stock", self.stock, AMOUNT_DIGITS)?;
        self.stock = quantize(self.stock);
        self.cost = non_negative("cost", self.cost)?;
        self.price = non_negative("price", self.price)?;
        Ok(self)
    }
}

fn require_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "this field may not be blank"));
    }
    Ok(())
}

fn non_negative(field: &str, value: Decimal) -> Result<Decimal, DomainError> {
    ensure_digits(field, value, QUANTITY_DIGITS)?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(DomainError::validation(field, "must be greater than or equal to 0"));
    }
    Ok(quantize(value))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::{PartDraft, ServiceDraft};

    #[test]
    fn service_price_is_quantized() {
        let service = ServiceDraft {
            code: " SRV-OIL ".to_owned(),
            name: "Cambio de aceite".to_owned(),
            description: String::new(),
            labor_minutes: 30,
            price: Decimal::from_str("49.995").expect("decimal"),
            is_active: true,
        }
        .prepare()
        .expect("valid service");

        assert_eq!(service.code, "SRV-OIL");
        assert_eq!(service.price.to_string(), "50.00");
    }

    #[test]
    fn negative_part_price_is_rejected() {
        let error = PartDraft {
            sku: "FLT-01".to_owned(),
            name: "Filtro".to_owned(),
            unit: String::new(),
            stock: Decimal::ZERO,
            cost: Decimal::ZERO,
            price: Decimal::from_str("-1").expect("decimal"),
            is_active: true,
        }
        .prepare()
        .expect_err("negative price");

        assert_eq!(error.field(), Some("price"));
    }

    #[test]
    fn price_wider_than_the_column_is_rejected() {
        let error = PartDraft {
            sku: "FLT-02".to_owned(),
            name: "Filtro".to_owned(),
            unit: String::new(),
            stock: Decimal::ZERO,
            cost: Decimal::ZERO,
            price: Decimal::from_str("100000000").expect("decimal"),
            is_active: true,
        }
        .prepare()
        .expect_err("too wide");

        assert_eq!(error.field(), Some("price"));
    }
}
