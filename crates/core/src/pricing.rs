//! Quotation money math.
//!
//! Two discount interpretations coexist. Stored totals subtract the line
//! discount as an amount; the read side treats a discount of at most 1 as a
//! fraction of the unit price and anything larger as a per-unit amount. Both are
//! kept behind [`DiscountRule`] so callers pick one explicitly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::line_item::LineItem;
use crate::money::quantize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountRule {
    /// `quantity * unit_price - discount`.
    Subtractive,
    /// `discount <= 1`: `quantity * unit_price * (1 - discount)`;
    /// otherwise `quantity * max(0, unit_price - discount)`.
    Hybrid,
}

pub fn line_total(
    rule: DiscountRule,
    quantity: Decimal,
    unit_price: Decimal,
    discount: Decimal,
) -> Decimal {
    match rule {
        DiscountRule::Subtractive => quantize(quantity * unit_price - discount),
        DiscountRule::Hybrid => {
            let effective = if discount <= Decimal::ONE {
                unit_price * (Decimal::ONE - discount)
            } else {
                unit_price - discount
            };
            quantize(quantity * effective.max(Decimal::ZERO))
        }
    }
}

/// Persisted derived fields of a quotation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationTotals {
    pub subtotal_services: Decimal,
    pub subtotal_parts: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
}

impl QuotationTotals {
    pub fn zero() -> Self {
        Self {
            subtotal_services: quantize(Decimal::ZERO),
            subtotal_parts: quantize(Decimal::ZERO),
            discount_total: quantize(Decimal::ZERO),
            tax_total: quantize(Decimal::ZERO),
            grand_total: quantize(Decimal::ZERO),
        }
    }
}

/// Recomputes the stored totals from the current lines.
///
/// Line contributions are summed unrounded, each subtotal is floored at zero
/// and quantized, and the grand total is never negative. Running it twice over
/// the same lines yields the same values.
pub fn recalc_totals(
    services: &[LineItem],
    parts: &[LineItem],
    discount_total: Decimal,
    tax_total: Decimal,
) -> QuotationTotals {
    let subtotal_services = floored_sum(services);
    let subtotal_parts = floored_sum(parts);
    let discount_total = quantize(discount_total.max(Decimal::ZERO));
    let tax_total = quantize(tax_total.max(Decimal::ZERO));
    let grand_total = quantize(
        (subtotal_services + subtotal_parts - discount_total + tax_total).max(Decimal::ZERO),
    );

    QuotationTotals { subtotal_services, subtotal_parts, discount_total, tax_total, grand_total }
}

fn floored_sum(lines: &[LineItem]) -> Decimal {
    let sum: Decimal =
        lines.iter().map(|line| line.quantity * line.unit_price - line.discount).sum();
    quantize(sum.max(Decimal::ZERO))
}

/// Read-side totals rendered next to the stored ones. These use the hybrid rule
/// and are not floored, so they can diverge from `grand_total`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayTotals {
    pub subtotal_services: Decimal,
    pub subtotal_parts: Decimal,
    pub total: Decimal,
}

pub fn display_totals(
    services: &[LineItem],
    parts: &[LineItem],
    discount_total: Decimal,
    tax_total: Decimal,
) -> DisplayTotals {
    let subtotal_services = hybrid_sum(services);
    let subtotal_parts = hybrid_sum(parts);
    let total = quantize(subtotal_services + subtotal_parts - discount_total + tax_total);
    DisplayTotals { subtotal_services, subtotal_parts, total }
}

fn hybrid_sum(lines: &[LineItem]) -> Decimal {
    quantize(lines.iter().map(LineItem::line_total).sum())
}
