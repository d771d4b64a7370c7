//! Response bodies that add read-side values to the stored records.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use workshop_core::domain::customer::CustomerId;
use workshop_core::domain::line_item::{LineItem, LineItemId, LineKind};
use workshop_core::domain::quotation::{Quotation, QuotationDetail, QuotationId, QuotationStatus};
use workshop_core::domain::vehicle::VehicleId;
use workshop_core::domain::workorder::{WorkOrder, WorkOrderId, WorkOrderStatus};

#[derive(Debug, Serialize)]
pub struct LineView {
    pub id: LineItemId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<i64>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub line_total: Decimal,
}

impl From<&LineItem> for LineView {
    fn from(line: &LineItem) -> Self {
        let (service, part) = match line.kind {
            LineKind::Service => (Some(line.catalog_id), None),
            LineKind::Part => (None, Some(line.catalog_id)),
        };
        Self {
            id: line.id,
            service,
            part,
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount: line.discount,
            line_total: line.line_total(),
        }
    }
}

fn lines(items: &[LineItem]) -> Vec<LineView> {
    items.iter().map(LineView::from).collect()
}

/// Stored header fields with `subtotal_services`, `subtotal_parts` and `total`
/// computed from the lines with the hybrid discount rule. `grand_total` is the
/// stored value and may differ from `total`.
#[derive(Debug, Serialize)]
pub struct QuotationView {
    pub id: QuotationId,
    pub number: String,
    pub status: QuotationStatus,
    pub customer: CustomerId,
    pub vehicle: Option<VehicleId>,
    pub notes: String,
    pub valid_until: Option<NaiveDate>,
    pub subtotal_services: Decimal,
    pub subtotal_parts: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
    pub total: Decimal,
    pub services: Vec<LineView>,
    pub parts: Vec<LineView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&QuotationDetail> for QuotationView {
    fn from(detail: &QuotationDetail) -> Self {
        let display = detail.display_totals();
        let quotation = &detail.quotation;
        Self {
            id: quotation.id,
            number: quotation.number.clone(),
            status: quotation.status,
            customer: quotation.customer,
            vehicle: quotation.vehicle,
            notes: quotation.notes.clone(),
            valid_until: quotation.valid_until,
            subtotal_services: display.subtotal_services,
            subtotal_parts: display.subtotal_parts,
            discount_total: quotation.totals.discount_total,
            tax_total: quotation.totals.tax_total,
            grand_total: quotation.totals.grand_total,
            total: display.total,
            services: lines(&detail.services),
            parts: lines(&detail.parts),
            created_at: quotation.created_at,
            updated_at: quotation.updated_at,
        }
    }
}

/// Body returned by the workflow actions.
#[derive(Debug, Serialize)]
pub struct StatusView {
    pub id: QuotationId,
    pub number: String,
    pub status: QuotationStatus,
}

impl From<Quotation> for StatusView {
    fn from(quotation: Quotation) -> Self {
        Self { id: quotation.id, number: quotation.number, status: quotation.status }
    }
}

#[derive(Debug, Serialize)]
pub struct WorkOrderView {
    pub id: WorkOrderId,
    pub number: String,
    pub customer: CustomerId,
    pub vehicle: VehicleId,
    pub status: WorkOrderStatus,
    pub complaint: Option<String>,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub services: Vec<LineView>,
    pub parts: Vec<LineView>,
}

impl From<&WorkOrder> for WorkOrderView {
    fn from(order: &WorkOrder) -> Self {
        Self {
            id: order.id,
            number: order.number.clone(),
            customer: order.customer,
            vehicle: order.vehicle,
            status: order.status,
            complaint: order.complaint.clone(),
            diagnosis: order.diagnosis.clone(),
            notes: order.notes.clone(),
            opened_at: order.opened_at,
            closed_at: order.closed_at,
            services: lines(&order.services),
            parts: lines(&order.parts),
        }
    }
}
