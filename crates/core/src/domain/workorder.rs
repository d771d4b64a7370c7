use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::line_item::LineItem;
use crate::domain::vehicle::VehicleId;
use crate::errors::DomainError;

pub const WORKORDER_NUMBER_PREFIX: &str = "WO";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkOrderId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkOrderStatus {
    Open,
    InProgress,
    Done,
    Cancelled,
}

impl WorkOrderStatus {
    pub const ALL: [WorkOrderStatus; 4] = [Self::Open, Self::InProgress, Self::Done, Self::Cancelled];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkOrderStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| DomainError::UnknownStatus(value.to_owned()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
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
    pub services: Vec<LineItem>,
    pub parts: Vec<LineItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderDraft {
    #[serde(default)]
    pub number: Option<String>,
    pub customer: CustomerId,
    pub vehicle: VehicleId,
    #[serde(default)]
    pub status: Option<WorkOrderStatus>,
    #[serde(default)]
    pub complaint: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// `closed_at` after moving from `previous` (if any) to `next`: stamped when the
/// order closes, kept while it stays closed, cleared when it is reopened.
pub fn closed_at_for(
    previous: Option<(WorkOrderStatus, Option<DateTime<Utc>>)>,
    next: WorkOrderStatus,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !next.is_closed() {
        return None;
    }
    match previous {
        Some((status, Some(closed_at))) if status.is_closed() => Some(closed_at),
        _ => Some(now),
    }
}

/// Note written on work orders forked from a quotation.
pub fn conversion_note(quotation_number: &str) -> String {
    format!("Generated from quotation {quotation_number}")
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{closed_at_for, WorkOrderStatus};

    #[test]
    fn status_round_trips_through_text() {
        assert_eq!("IN_PROGRESS".parse::<WorkOrderStatus>(), Ok(WorkOrderStatus::InProgress));
        assert!("PAUSED".parse::<WorkOrderStatus>().is_err());
    }

    #[test]
    fn closing_stamps_and_reopening_clears() {
        let now = Utc::now();
        let earlier = now - Duration::hours(3);

        assert_eq!(closed_at_for(None, WorkOrderStatus::Open, now), None);
        assert_eq!(
            closed_at_for(Some((WorkOrderStatus::InProgress, None)), WorkOrderStatus::Done, now),
            Some(now)
        );
        assert_eq!(
            closed_at_for(
                Some((WorkOrderStatus::Done, Some(earlier))),
                WorkOrderStatus::Cancelled,
                now
            ),
            Some(earlier)
        );
        assert_eq!(
            closed_at_for(Some((WorkOrderStatus::Done, Some(earlier))), WorkOrderStatus::Open, now),
            None
        );
    }
}
