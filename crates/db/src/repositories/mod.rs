use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::error::ErrorKind;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use thiserror::Error;

use workshop_core::errors::{ApplicationError, DomainError};

use crate::DbPool;

pub mod authorization;
pub mod catalog;
pub mod customer;
pub mod lines;
pub mod numbering;
pub mod quotation;
pub mod vehicle;
pub mod workorder;

pub use authorization::{bootstrap_roles, RoleBootstrapReport, SqlAuthorizationStore};
pub use catalog::{CatalogFilter, SqlCatalogRepository};
pub use customer::{CustomerFilter, SqlCustomerRepository};
pub use quotation::{ConversionResult, QuotationFilter, SqlQuotationRepository};
pub use vehicle::{SqlVehicleRepository, VehicleFilter};
pub use workorder::{SqlWorkOrderRepository, WorkOrderFilter};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("{message}")]
    Conflict { message: String, retryable: bool },
    #[error("{0}")]
    Protected(String),
    /// A well-formed request the current state does not allow.
    #[error("{0}")]
    Rejected(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Classifies a failed INSERT or UPDATE. Unique violations become field
    /// errors and CHECK failures invariant violations. A foreign-key failure
    /// here means a referenced row is missing, reported under `non_field_errors`.
    pub fn classify(error: sqlx::Error) -> Self {
        Self::classify_reference(error, "non_field_errors")
    }

    /// [`Self::classify`] with foreign-key failures reported under `field`.
    pub fn classify_reference(error: sqlx::Error, field: &str) -> Self {
        Self::classify_with(error, || {
            Self::Domain(DomainError::validation(
                field,
                "the referenced record does not exist or was removed",
            ))
        })
    }

    /// Classifies a failed DELETE, where a foreign-key failure means other rows
    /// still reference the target.
    pub fn classify_delete(error: sqlx::Error) -> Self {
        Self::classify_with(error, || {
            Self::Protected(
                "the record is referenced by other records and cannot be removed".to_owned(),
            )
        })
    }

    fn classify_with(error: sqlx::Error, foreign_key: impl FnOnce() -> Self) -> Self {
        let sqlx::Error::Database(database_error) = &error else {
            return Self::Database(error);
        };

        let message = database_error.message().to_owned();
        match database_error.kind() {
            ErrorKind::UniqueViolation => {
                let field = unique_violation_field(&message).unwrap_or("non_field_errors");
                Self::Domain(DomainError::validation(
                    field,
                    format!("a record with this {field} already exists"),
                ))
            }
            ErrorKind::ForeignKeyViolation => foreign_key(),
            ErrorKind::CheckViolation => {
                Self::Domain(DomainError::InvariantViolation(format!("constraint failed: {message}")))
            }
            _ => Self::Database(error),
        }
    }

    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(
            self,
            Self::Domain(DomainError::Validation { field, .. }) if field == column
        )
    }
}

/// `UNIQUE constraint failed: vehicle.plate` -> `plate`.
fn unique_violation_field(message: &str) -> Option<&str> {
    message
        .strip_prefix("UNIQUE constraint failed: ")
        .and_then(|columns| columns.split(',').next())
        .and_then(|column| column.trim().rsplit('.').next())
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Domain(domain) => Self::Domain(domain),
            RepositoryError::NotFound { entity, id } => Self::not_found(entity, id),
            RepositoryError::Conflict { message, retryable } => Self::Conflict { message, retryable },
            RepositoryError::Protected(message) => Self::Conflict { message, retryable: false },
            RepositoryError::Rejected(message) => Self::BadRequest(message),
            RepositoryError::Database(error) => Self::Persistence(error.to_string()),
            RepositoryError::Decode(message) => Self::Persistence(message),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page: page.max(1), page_size: page_size.max(1) }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub page: u32,
    pub page_size: u32,
    pub results: Vec<T>,
}

/// Opens a write transaction holding the database write lock from its first
/// statement. A deferred transaction that reads first cannot upgrade once another
/// writer has committed, and SQLite then fails with SQLITE_BUSY without waiting.
pub(crate) async fn begin_write(pool: &DbPool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// RFC 3339 with fixed microsecond precision so text ordering matches time ordering.
pub(crate) fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn get_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, RepositoryError> {
    let raw: String = row.try_get(column).map_err(decode_err)?;
    Decimal::from_str(&raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal in `{column}`: {error}")))
}

pub(crate) fn get_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    let raw: String = row.try_get(column).map_err(decode_err)?;
    parse_timestamp(column, &raw)
}

pub(crate) fn get_optional_timestamp(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    let raw: Option<String> = row.try_get(column).map_err(decode_err)?;
    raw.map(|value| parse_timestamp(column, &value)).transpose()
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp in `{column}`: {error}")))
}

pub(crate) fn get_optional_date(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<NaiveDate>, RepositoryError> {
    let raw: Option<String> = row.try_get(column).map_err(decode_err)?;
    raw.map(|value| {
        NaiveDate::parse_from_str(&value, "%Y-%m-%d")
            .map_err(|error| RepositoryError::Decode(format!("invalid date in `{column}`: {error}")))
    })
    .transpose()
}

pub(crate) fn get_u32(row: &SqliteRow, column: &str) -> Result<u32, RepositoryError> {
    let raw: i64 = row.try_get(column).map_err(decode_err)?;
    u32::try_from(raw)
        .map_err(|_| RepositoryError::Decode(format!("`{column}` value {raw} is out of range")))
}

/// `%term%` for LIKE searches, with the wildcard characters escaped by `\`.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term.trim().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{connect_with_settings, migrations, DbPool};

    pub async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }
}

#[cfg(test)]
mod tests {
    use workshop_core::errors::DomainError;

    use super::test_support::pool;
    use super::{like_pattern, unique_violation_field, PageRequest, RepositoryError};

    const INSERT_VEHICLE: &str = "INSERT INTO vehicle (owner_id, plate, brand, model, year, created_at, updated_at)
         VALUES (?, 'ABC-123', 'Nissan', 'Versa', 2020, '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')";

    #[test]
    fn unique_violation_names_the_column() {
        assert_eq!(unique_violation_field("UNIQUE constraint failed: vehicle.plate"), Some("plate"));
        assert_eq!(
            unique_violation_field("UNIQUE constraint failed: role_capability.role, role_capability.capability"),
            Some("role")
        );
        assert_eq!(unique_violation_field("something else"), None);
    }

    #[test]
    fn page_offsets_are_one_based() {
        let page = PageRequest::new(3, 20);
        assert_eq!(page.offset(), 40);
        assert_eq!(PageRequest::new(0, 0), PageRequest { page: 1, page_size: 1 });
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" 50%_off "), "%50\\%\\_off%");
    }

    #[tokio::test]
    async fn foreign_key_failures_are_classified_by_statement() {
        let pool = pool().await;

        let dangling = sqlx::query(INSERT_VEHICLE)
            .bind(999_i64)
            .execute(&pool)
            .await
            .map_err(|error| RepositoryError::classify_reference(error, "owner"))
            .expect_err("owner 999 does not exist");
        assert!(
            matches!(&dangling, RepositoryError::Domain(DomainError::Validation { field, .. }) if field == "owner"),
            "{dangling:?}"
        );

        let customer = sqlx::query(
            "INSERT INTO customer (name, created_at, updated_at)
             VALUES ('Ana', '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .expect("customer")
        .last_insert_rowid();
        sqlx::query(INSERT_VEHICLE).bind(customer).execute(&pool).await.expect("vehicle");

        let referenced = sqlx::query("DELETE FROM customer WHERE id = ?")
            .bind(customer)
            .execute(&pool)
            .await
            .map_err(RepositoryError::classify_delete)
            .expect_err("vehicle still references the customer");
        assert!(matches!(referenced, RepositoryError::Protected(_)));
    }
}
