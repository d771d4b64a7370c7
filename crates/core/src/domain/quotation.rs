use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::line_item::{LineItem, LineItemInput};
use crate::domain::vehicle::VehicleId;
use crate::errors::DomainError;
use crate::money::{ensure_digits, AMOUNT_DIGITS};
use crate::pricing::{display_totals, DisplayTotals, QuotationTotals};

pub const QUOTATION_NUMBER_PREFIX: &str = "Q";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuotationId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotationStatus {
    Draft,
    Sent,
    Approved,
    Rejected,
    Expired,
}

impl QuotationStatus {
    pub const ALL: [QuotationStatus; 5] =
        [Self::Draft, Self::Sent, Self::Approved, Self::Rejected, Self::Expired];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Sent => "SENT",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn allowed_targets(self) -> &'static [QuotationStatus] {
        match self {
            Self::Draft => &[Self::Sent, Self::Rejected],
            Self::Sent => &[Self::Approved, Self::Rejected],
            Self::Approved | Self::Rejected | Self::Expired => &[],
        }
    }

    pub fn can_transition_to(self, next: QuotationStatus) -> bool {
        self.allowed_targets().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }
}

impl fmt::Display for QuotationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotationStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| DomainError::UnknownStatus(value.to_owned()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub number: String,
    pub status: QuotationStatus,
    pub customer: CustomerId,
    pub vehicle: Option<VehicleId>,
    pub notes: String,
    pub valid_until: Option<NaiveDate>,
    #[serde(flatten)]
    pub totals: QuotationTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quotation {
    pub fn transition_to(&mut self, next: QuotationStatus) -> Result<(), DomainError> {
        if self.status.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidQuotationTransition { from: self.status, to: next })
    }

    /// Applies one of the fixed-target workflow actions. Without enforcement the
    /// target is assigned as-is, which is how approve/reject/send have always
    /// behaved for existing clients.
    pub fn apply_action(&mut self, next: QuotationStatus, enforce: bool) -> Result<(), DomainError> {
        if enforce {
            return self.transition_to(next);
        }
        self.status = next;
        Ok(())
    }

    /// Arbitrary status change. Only membership in the declared statuses is checked.
    pub fn set_status(&mut self, raw: &str) -> Result<(), DomainError> {
        self.status = raw.parse()?;
        Ok(())
    }
}

/// Header fields supplied by clients on create and full update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationDraft {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub status: Option<QuotationStatus>,
    pub customer: CustomerId,
    #[serde(default)]
    pub vehicle: Option<VehicleId>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
    #[serde(default)]
    pub discount_total: Decimal,
    #[serde(default)]
    pub tax_total: Decimal,
}

impl QuotationDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(number) = &self.number {
            if number.chars().count() > 20 {
                return Err(DomainError::validation(
                    "number",
                    "ensure this field has no more than 20 characters",
                ));
            }
        }
        ensure_digits("discount_total", self.discount_total, AMOUNT_DIGITS)?;
        ensure_digits("tax_total", self.tax_total, AMOUNT_DIGITS)?;
        if self.discount_total < Decimal::ZERO {
            return Err(DomainError::validation("discount_total", "must be greater than or equal to 0"));
        }
        if self.tax_total < Decimal::ZERO {
            return Err(DomainError::validation("tax_total", "must be greater than or equal to 0"));
        }
        Ok(())
    }

    /// Full replacement of the header, as sent by `PUT`.
    pub fn into_patch(
        self,
        services: Option<Vec<LineItemInput>>,
        parts: Option<Vec<LineItemInput>>,
    ) -> QuotationPatch {
        QuotationPatch {
            number: self.number,
            status: self.status,
            customer: Some(self.customer),
            vehicle: Some(self.vehicle),
            notes: Some(self.notes),
            valid_until: Some(self.valid_until),
            discount_total: Some(self.discount_total),
            tax_total: Some(self.tax_total),
            services,
            parts,
        }
    }
}

/// Partial update. `None` leaves a field untouched; for the nullable fields
/// `Some(None)` clears them. Line collections, when present, replace the stored
/// lines by diff: entries with an id update, entries without one are created,
/// stored lines missing from the list are deleted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuotationPatch {
    pub number: Option<String>,
    pub status: Option<QuotationStatus>,
    pub customer: Option<CustomerId>,
    pub vehicle: Option<Option<VehicleId>>,
    pub notes: Option<String>,
    pub valid_until: Option<Option<NaiveDate>>,
    pub discount_total: Option<Decimal>,
    pub tax_total: Option<Decimal>,
    pub services: Option<Vec<LineItemInput>>,
    pub parts: Option<Vec<LineItemInput>>,
}

impl QuotationPatch {
    /// Header values after applying the patch to `current`.
    pub fn merge(&self, current: &Quotation) -> QuotationDraft {
        QuotationDraft {
            number: Some(self.number.clone().unwrap_or_else(|| current.number.clone())),
            status: Some(self.status.unwrap_or(current.status)),
            customer: self.customer.unwrap_or(current.customer),
            vehicle: self.vehicle.unwrap_or(current.vehicle),
            notes: self.notes.clone().unwrap_or_else(|| current.notes.clone()),
            valid_until: self.valid_until.unwrap_or(current.valid_until),
            discount_total: self.discount_total.unwrap_or(current.totals.discount_total),
            tax_total: self.tax_total.unwrap_or(current.totals.tax_total),
        }
    }
}

/// A quotation together with its lines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationDetail {
    pub quotation: Quotation,
    pub services: Vec<LineItem>,
    pub parts: Vec<LineItem>,
}

impl QuotationDetail {
    pub fn display_totals(&self) -> DisplayTotals {
        display_totals(
            &self.services,
            &self.parts,
            self.quotation.totals.discount_total,
            self.quotation.totals.tax_total,
        )
    }
}

/// A vehicle attached to a quotation must belong to the quotation's customer.
pub fn validate_vehicle_owner(
    customer: CustomerId,
    vehicle_owner: Option<CustomerId>,
) -> Result<(), DomainError> {
    match vehicle_owner {
        Some(owner) if owner != customer => Err(DomainError::validation(
            "vehicle",
            "the vehicle does not belong to the selected customer",
        )),
        _ => Ok(()),
    }
}

/// `Q-2026-` for quotations, `WO-2026-` for work orders.
pub fn number_prefix(kind: &str, year: i32) -> String {
    format!("{kind}-{year}-")
}

pub fn format_number(prefix: &str, sequence: u32) -> String {
    format!("{prefix}{sequence:04}")
}

/// Sequence following the greatest existing number under a prefix. A missing
/// or non-numeric suffix restarts at 1.
pub fn next_sequence(last_number: Option<&str>) -> u32 {
    last_number
        .and_then(|number| number.rsplit('-').next())
        .filter(|suffix| !suffix.is_empty() && suffix.chars().all(|ch| ch.is_ascii_digit()))
        .and_then(|suffix| suffix.parse::<u32>().ok())
        .map_or(1, |last| last.saturating_add(1))
}
