use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub owner: CustomerId,
    pub plate: String,
    pub vin: Option<String>,
    pub brand: String,
    pub model: String,
    pub year: u32,
    pub color: Option<String>,
    pub mileage_km: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDraft {
    pub owner: CustomerId,
    pub plate: String,
    #[serde(default)]
    pub vin: Option<String>,
    pub brand: String,
    pub model: String,
    pub year: u32,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub mileage_km: u32,
}

impl VehicleDraft {
    /// Plates are stored upper-cased without surrounding whitespace so the
    /// uniqueness constraint is not defeated by formatting.
    pub fn normalize(mut self) -> Self {
        self.plate = self.plate.trim().to_uppercase();
        self.vin = self.vin.map(|vin| vin.trim().to_uppercase()).filter(|vin| !vin.is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.plate.trim().is_empty() {
            return Err(DomainError::validation("plate", "this field may not be blank"));
        }
        if self.plate.chars().count() > 20 {
            return Err(DomainError::validation("plate", "ensure this field has no more than 20 characters"));
        }
        if self.brand.trim().is_empty() {
            return Err(DomainError::validation("brand", "this field may not be blank"));
        }
        if self.model.trim().is_empty() {
            return Err(DomainError::validation("model", "this field may not be blank"));
        }
        Ok(())
    }
}
