//! Quotation aggregate persistence.
//!
//! Every mutation of the aggregate runs in one transaction and ends with a
//! totals recompute from the lines as stored in that transaction. Standalone
//! line mutations recompute in a savepoint and keep the line change if the
//! recompute fails.

use chrono::{Datelike, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::{debug, info, warn};

use workshop_core::config::WorkflowConfig;
use workshop_core::domain::customer::CustomerId;
use workshop_core::domain::line_item::{LineItem, LineItemId, LineItemInput, LineKind, PreparedLine};
use workshop_core::domain::quotation::{
    validate_vehicle_owner, Quotation, QuotationDetail, QuotationDraft, QuotationId, QuotationPatch,
    QuotationStatus, QUOTATION_NUMBER_PREFIX,
};
use workshop_core::domain::vehicle::VehicleId;
use workshop_core::domain::workorder::{
    conversion_note, WorkOrderId, WorkOrderStatus, WORKORDER_NUMBER_PREFIX,
};
use workshop_core::errors::DomainError;
use workshop_core::money::quantize;
use workshop_core::pricing::{recalc_totals, QuotationTotals};

use super::lines::{
    prepare_all, LineTable, QUOTATION_PARTS, QUOTATION_SERVICES, WORKORDER_PARTS, WORKORDER_SERVICES,
};
use super::numbering::allocate_number;
use super::{
    begin_write, decode_err, get_decimal, get_optional_date, get_timestamp, like_pattern,
    timestamp, Page, PageRequest, RepositoryError,
};
use crate::DbPool;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuotationFilter {
    pub status: Option<QuotationStatus>,
    pub customer: Option<CustomerId>,
    pub vehicle: Option<VehicleId>,
    /// Matches the quotation number, the customer name or the vehicle plate.
    pub search: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    pub workorder_id: WorkOrderId,
    pub from_quotation: String,
}

#[derive(Clone)]
pub struct SqlQuotationRepository {
    pool: DbPool,
    workflow: WorkflowConfig,
}

const HEADER_COLUMNS: &str = "q.id, q.number, q.status, q.customer_id, q.vehicle_id, q.notes,
    q.valid_until, q.subtotal_services, q.subtotal_parts, q.discount_total, q.tax_total,
    q.grand_total, q.created_at, q.updated_at";

fn row_to_quotation(row: &SqliteRow) -> Result<Quotation, RepositoryError> {
    let status: String = row.try_get("status").map_err(decode_err)?;
    let vehicle: Option<i64> = row.try_get("vehicle_id").map_err(decode_err)?;

    Ok(Quotation {
        id: QuotationId(row.try_get("id").map_err(decode_err)?),
        number: row.try_get("number").map_err(decode_err)?,
        status: status
            .parse()
            .map_err(|error: DomainError| RepositoryError::Decode(error.to_string()))?,
        customer: CustomerId(row.try_get("customer_id").map_err(decode_err)?),
        vehicle: vehicle.map(VehicleId),
        notes: row.try_get("notes").map_err(decode_err)?,
        valid_until: get_optional_date(row, "valid_until")?,
        totals: QuotationTotals {
            subtotal_services: get_decimal(row, "subtotal_services")?,
            subtotal_parts: get_decimal(row, "subtotal_parts")?,
            discount_total: get_decimal(row, "discount_total")?,
            tax_total: get_decimal(row, "tax_total")?,
            grand_total: get_decimal(row, "grand_total")?,
        },
        created_at: get_timestamp(row, "created_at")?,
        updated_at: get_timestamp(row, "updated_at")?,
    })
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &QuotationFilter) {
    builder.push(
        " FROM quotation q
          JOIN customer c ON c.id = q.customer_id
          LEFT JOIN vehicle v ON v.id = q.vehicle_id
          WHERE 1=1",
    );
    if let Some(status) = filter.status {
        builder.push(" AND q.status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(customer) = filter.customer {
        builder.push(" AND q.customer_id = ");
        builder.push_bind(customer.0);
    }
    if let Some(vehicle) = filter.vehicle {
        builder.push(" AND q.vehicle_id = ");
        builder.push_bind(vehicle.0);
    }
    if let Some(term) = filter.search.as_deref().filter(|term| !term.trim().is_empty()) {
        let pattern = like_pattern(term);
        builder.push(" AND (q.number LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR c.name LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR v.plate LIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }
}

fn date_text(value: Option<chrono::NaiveDate>) -> Option<String> {
    value.map(|date| date.format("%Y-%m-%d").to_string())
}

async fn load_header(
    conn: &mut SqliteConnection,
    id: QuotationId,
) -> Result<Option<Quotation>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {HEADER_COLUMNS} FROM quotation q WHERE q.id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_quotation).transpose()
}

async fn load_detail(
    conn: &mut SqliteConnection,
    quotation: Quotation,
) -> Result<QuotationDetail, RepositoryError> {
    let services = QUOTATION_SERVICES.load(conn, quotation.id.0).await?;
    let parts = QUOTATION_PARTS.load(conn, quotation.id.0).await?;
    Ok(QuotationDetail { quotation, services, parts })
}

/// Recomputes and persists the derived totals from the stored lines. Only the
/// derived columns and `updated_at` are written.
async fn recalc_in(
    conn: &mut SqliteConnection,
    id: QuotationId,
) -> Result<QuotationTotals, RepositoryError> {
    let header = load_header(conn, id).await?.ok_or_else(|| RepositoryError::not_found("quotation", id.0))?;
    let services = QUOTATION_SERVICES.load(conn, id.0).await?;
    let parts = QUOTATION_PARTS.load(conn, id.0).await?;
    let totals = recalc_totals(&services, &parts, header.totals.discount_total, header.totals.tax_total);

    sqlx::query(
        "UPDATE quotation
         SET subtotal_services = ?, subtotal_parts = ?, discount_total = ?, tax_total = ?,
             grand_total = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(totals.subtotal_services.to_string())
    .bind(totals.subtotal_parts.to_string())
    .bind(totals.discount_total.to_string())
    .bind(totals.tax_total.to_string())
    .bind(totals.grand_total.to_string())
    .bind(timestamp(Utc::now()))
    .bind(id.0)
    .execute(&mut *conn)
    .await
    .map_err(RepositoryError::classify)?;

    debug!(
        event_name = "quotation.recalculated",
        quotation_id = id.0,
        grand_total = %totals.grand_total,
        "quotation totals recalculated"
    );
    Ok(totals)
}

/// Recompute inside a savepoint. A failure is logged and rolled back to the
/// savepoint; the caller's changes stay in place.
async fn recalc_best_effort(conn: &mut SqliteConnection, id: QuotationId) -> Result<(), RepositoryError> {
    let mut savepoint = sqlx::Connection::begin(&mut *conn).await?;
    match recalc_in(&mut savepoint, id).await {
        Ok(_) => savepoint.commit().await?,
        Err(error) => {
            warn!(
                event_name = "quotation.recalc_failed",
                quotation_id = id.0,
                error = %error,
                "quotation totals were not recalculated"
            );
            savepoint.rollback().await?;
        }
    }
    Ok(())
}

impl SqlQuotationRepository {
    pub fn new(pool: DbPool, workflow: WorkflowConfig) -> Self {
        Self { pool, workflow }
    }

    pub async fn list(
        &self,
        filter: &QuotationFilter,
        page: PageRequest,
    ) -> Result<Page<QuotationDetail>, RepositoryError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {HEADER_COLUMNS}"));
        push_filters(&mut select, filter);
        select.push(" ORDER BY q.created_at DESC, q.id DESC LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());
        let rows = select.build().fetch_all(&self.pool).await?;

        let mut conn = self.pool.acquire().await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(load_detail(&mut conn, row_to_quotation(row)?).await?);
        }

        Ok(Page { count: total, page: page.page, page_size: page.page_size, results })
    }

    pub async fn find(&self, id: QuotationId) -> Result<Option<QuotationDetail>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        match load_header(&mut conn, id).await? {
            Some(quotation) => Ok(Some(load_detail(&mut conn, quotation).await?)),
            None => Ok(None),
        }
    }

    pub async fn get(&self, id: QuotationId) -> Result<QuotationDetail, RepositoryError> {
        self.find(id).await?.ok_or_else(|| RepositoryError::not_found("quotation", id.0))
    }

    async fn get_header(&self, id: QuotationId) -> Result<Quotation, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_header(&mut conn, id).await?.ok_or_else(|| RepositoryError::not_found("quotation", id.0))
    }

    /// Field checks plus the rule that an attached vehicle belongs to the customer.
    async fn validate_header(&self, draft: &QuotationDraft) -> Result<(), RepositoryError> {
        draft.validate()?;

        let customer: Option<i64> = sqlx::query_scalar("SELECT id FROM customer WHERE id = ?")
            .bind(draft.customer.0)
            .fetch_optional(&self.pool)
            .await?;
        if customer.is_none() {
            return Err(DomainError::validation(
                "customer",
                format!("invalid pk \"{}\" - object does not exist", draft.customer.0),
            )
            .into());
        }

        if let Some(vehicle) = draft.vehicle {
            let owner: Option<i64> = sqlx::query_scalar("SELECT owner_id FROM vehicle WHERE id = ?")
                .bind(vehicle.0)
                .fetch_optional(&self.pool)
                .await?;
            let Some(owner) = owner else {
                return Err(DomainError::validation(
                    "vehicle",
                    format!("invalid pk \"{}\" - object does not exist", vehicle.0),
                )
                .into());
            };
            validate_vehicle_owner(draft.customer, Some(CustomerId(owner)))?;
        }

        Ok(())
    }

    /// Creates the quotation with its lines. Without an explicit number the
    /// next `Q-<year>-NNNN` is allocated; a collision on that number is retried
    /// up to `workflow.number_retry_attempts` times before a retryable conflict.
    pub async fn create(
        &self,
        draft: QuotationDraft,
        services: Vec<LineItemInput>,
        parts: Vec<LineItemInput>,
    ) -> Result<QuotationDetail, RepositoryError> {
        self.validate_header(&draft).await?;
        let services = prepare_all(services, LineKind::Service)?;
        let parts = prepare_all(parts, LineKind::Part)?;
        let explicit_number = draft.number.as_deref().map(str::trim).filter(|number| !number.is_empty());

        let attempts = self.workflow.number_retry_attempts.max(1);
        for attempt in 1..=attempts {
            match self.try_create(&draft, explicit_number, &services, &parts).await {
                Err(error) if explicit_number.is_none() && error.is_unique_violation_on("number") => {
                    warn!(
                        event_name = "quotation.number_collision",
                        attempt,
                        max_attempts = attempts,
                        "quotation number already taken, retrying"
                    );
                }
                Ok(id) => return self.get(id).await,
                Err(error) => return Err(error),
            }
        }

        Err(RepositoryError::Conflict {
            message: "could not allocate a unique quotation number; retry the request".to_owned(),
            retryable: true,
        })
    }

    async fn try_create(
        &self,
        draft: &QuotationDraft,
        explicit_number: Option<&str>,
        services: &[PreparedLine],
        parts: &[PreparedLine],
    ) -> Result<QuotationId, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;

        let number = match explicit_number {
            Some(number) => number.to_owned(),
            None => {
                allocate_number(&mut tx, "quotation", QUOTATION_NUMBER_PREFIX, Utc::now().year()).await?
            }
        };
        let now = timestamp(Utc::now());

        let result = sqlx::query(
            "INSERT INTO quotation (number, status, customer_id, vehicle_id, notes, valid_until,
                                    discount_total, tax_total, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&number)
        .bind(draft.status.unwrap_or(QuotationStatus::Draft).as_str())
        .bind(draft.customer.0)
        .bind(draft.vehicle.map(|vehicle| vehicle.0))
        .bind(&draft.notes)
        .bind(date_text(draft.valid_until))
        .bind(quantize(draft.discount_total).to_string())
        .bind(quantize(draft.tax_total).to_string())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::classify)?;
        let id = QuotationId(result.last_insert_rowid());

        for line in services {
            QUOTATION_SERVICES.insert(&mut tx, id.0, line).await?;
        }
        for line in parts {
            QUOTATION_PARTS.insert(&mut tx, id.0, line).await?;
        }
        let totals = recalc_in(&mut tx, id).await?;

        tx.commit().await?;
        info!(
            event_name = "quotation.created",
            quotation_id = id.0,
            number = %number,
            grand_total = %totals.grand_total,
            "quotation created"
        );
        Ok(id)
    }

    /// Applies `patch` to the header and, for each line collection present,
    /// replaces the stored lines by diff. Totals are recomputed before commit.
    pub async fn update(
        &self,
        id: QuotationId,
        patch: QuotationPatch,
    ) -> Result<QuotationDetail, RepositoryError> {
        let current = self.get_header(id).await?;
        let merged = patch.merge(&current);
        self.validate_header(&merged).await?;
        let number = merged.number.as_deref().map(str::trim).unwrap_or_default().to_owned();
        if number.is_empty() {
            return Err(DomainError::validation("number", "this field may not be blank").into());
        }
        let services = patch.services.map(|lines| prepare_all(lines, LineKind::Service)).transpose()?;
        let parts = patch.parts.map(|lines| prepare_all(lines, LineKind::Part)).transpose()?;

        let mut tx = begin_write(&self.pool).await?;
        let result = sqlx::query(
            "UPDATE quotation
             SET number = ?, status = ?, customer_id = ?, vehicle_id = ?, notes = ?,
                 valid_until = ?, discount_total = ?, tax_total = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&number)
        .bind(merged.status.unwrap_or(current.status).as_str())
        .bind(merged.customer.0)
        .bind(merged.vehicle.map(|vehicle| vehicle.0))
        .bind(&merged.notes)
        .bind(date_text(merged.valid_until))
        .bind(quantize(merged.discount_total).to_string())
        .bind(quantize(merged.tax_total).to_string())
        .bind(timestamp(Utc::now()))
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::classify)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("quotation", id.0));
        }

        if let Some(services) = &services {
            QUOTATION_SERVICES.sync(&mut tx, id.0, services).await?;
        }
        if let Some(parts) = &parts {
            QUOTATION_PARTS.sync(&mut tx, id.0, parts).await?;
        }
        recalc_in(&mut tx, id).await?;
        tx.commit().await?;

        info!(event_name = "quotation.updated", quotation_id = id.0, "quotation updated");
        self.get(id).await
    }

    pub async fn delete(&self, id: QuotationId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM quotation WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::classify_delete)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("quotation", id.0));
        }
        info!(event_name = "quotation.deleted", quotation_id = id.0, "quotation deleted");
        Ok(())
    }

    pub async fn approve(&self, id: QuotationId) -> Result<Quotation, RepositoryError> {
        self.apply_action(id, QuotationStatus::Approved).await
    }

    pub async fn reject(&self, id: QuotationId) -> Result<Quotation, RepositoryError> {
        self.apply_action(id, QuotationStatus::Rejected).await
    }

    pub async fn send(&self, id: QuotationId) -> Result<Quotation, RepositoryError> {
        self.apply_action(id, QuotationStatus::Sent).await
    }

    async fn apply_action(
        &self,
        id: QuotationId,
        target: QuotationStatus,
    ) -> Result<Quotation, RepositoryError> {
        let mut quotation = self.get_header(id).await?;
        let previous = quotation.status;
        quotation.apply_action(target, self.workflow.enforce_transitions)?;
        self.store_status(quotation, previous).await
    }

    /// Moves to any declared status; unknown values are a bad request.
    pub async fn set_status(&self, id: QuotationId, raw: &str) -> Result<Quotation, RepositoryError> {
        let mut quotation = self.get_header(id).await?;
        let previous = quotation.status;
        quotation.set_status(raw).map_err(|error| match error {
            DomainError::UnknownStatus(value) => RepositoryError::Rejected(format!(
                "invalid status `{value}`; expected one of {}",
                QuotationStatus::ALL.map(QuotationStatus::as_str).join(", ")
            )),
            other => RepositoryError::Domain(other),
        })?;
        self.store_status(quotation, previous).await
    }

    /// Compare-and-set on the status read by the caller, so a concurrent
    /// change surfaces as a retryable conflict instead of being overwritten.
    async fn store_status(
        &self,
        mut quotation: Quotation,
        previous: QuotationStatus,
    ) -> Result<Quotation, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE quotation SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(quotation.status.as_str())
        .bind(timestamp(now))
        .bind(quotation.id.0)
        .bind(previous.as_str())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::classify)?;

        if result.rows_affected() == 0 {
            self.get_header(quotation.id).await?;
            return Err(RepositoryError::Conflict {
                message: "the quotation status changed concurrently; retry the request".to_owned(),
                retryable: true,
            });
        }

        info!(
            event_name = "quotation.status_changed",
            quotation_id = quotation.id.0,
            from = previous.as_str(),
            to = quotation.status.as_str(),
            "quotation status changed"
        );
        quotation.updated_at = now;
        Ok(quotation)
    }

    pub async fn add_line(
        &self,
        id: QuotationId,
        kind: LineKind,
        input: LineItemInput,
    ) -> Result<LineItem, RepositoryError> {
        let line = input.prepare(kind)?;
        self.get_header(id).await?;

        let mut tx = begin_write(&self.pool).await?;
        let stored = LineTable::for_quotation(kind).insert(&mut tx, id.0, &line).await?;
        recalc_best_effort(&mut tx, id).await?;
        tx.commit().await?;

        info!(
            event_name = "quotation.line_added",
            quotation_id = id.0,
            kind = kind.as_str(),
            line_id = stored.id.0,
            "quotation line added"
        );
        Ok(stored)
    }

    pub async fn update_line(
        &self,
        id: QuotationId,
        kind: LineKind,
        line_id: LineItemId,
        input: LineItemInput,
    ) -> Result<LineItem, RepositoryError> {
        let line = input.prepare(kind)?;

        let mut tx = begin_write(&self.pool).await?;
        let stored = LineTable::for_quotation(kind)
            .update(&mut tx, id.0, line_id, &line)
            .await?
            .ok_or_else(|| RepositoryError::not_found("quotation line", line_id.0))?;
        recalc_best_effort(&mut tx, id).await?;
        tx.commit().await?;

        info!(
            event_name = "quotation.line_updated",
            quotation_id = id.0,
            kind = kind.as_str(),
            line_id = line_id.0,
            "quotation line updated"
        );
        Ok(stored)
    }

    pub async fn delete_line(
        &self,
        id: QuotationId,
        kind: LineKind,
        line_id: LineItemId,
    ) -> Result<(), RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        if !LineTable::for_quotation(kind).delete(&mut tx, id.0, line_id).await? {
            return Err(RepositoryError::not_found("quotation line", line_id.0));
        }
        recalc_best_effort(&mut tx, id).await?;
        tx.commit().await?;

        info!(
            event_name = "quotation.line_deleted",
            quotation_id = id.0,
            kind = kind.as_str(),
            line_id = line_id.0,
            "quotation line deleted"
        );
        Ok(())
    }

    /// Explicit recompute of the stored totals.
    pub async fn recalculate(&self, id: QuotationId) -> Result<Quotation, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        recalc_in(&mut tx, id).await?;
        let quotation = load_header(&mut tx, id).await?.ok_or_else(|| RepositoryError::not_found("quotation", id.0))?;
        tx.commit().await?;
        Ok(quotation)
    }

    /// Forks an APPROVED quotation into an OPEN work order carrying verbatim
    /// copies of its lines. All or nothing.
    pub async fn convert_to_workorder(&self, id: QuotationId) -> Result<ConversionResult, RepositoryError> {
        ensure_convertible(&self.get_header(id).await?)?;

        let mut tx = begin_write(&self.pool).await?;
        let number =
            allocate_number(&mut tx, "workorder", WORKORDER_NUMBER_PREFIX, Utc::now().year()).await?;

        // Re-read under the write lock taken by the allocation.
        let quotation =
            load_header(&mut tx, id).await?.ok_or_else(|| RepositoryError::not_found("quotation", id.0))?;
        let vehicle = ensure_convertible(&quotation)?;

        let result = sqlx::query(
            "INSERT INTO workorder (number, customer_id, vehicle_id, status, notes, opened_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&number)
        .bind(quotation.customer.0)
        .bind(vehicle.0)
        .bind(WorkOrderStatus::Open.as_str())
        .bind(conversion_note(&quotation.number))
        .bind(timestamp(Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::classify)?;
        let workorder_id = WorkOrderId(result.last_insert_rowid());

        let services = QUOTATION_SERVICES.copy_into(&mut tx, WORKORDER_SERVICES, id.0, workorder_id.0).await?;
        let parts = QUOTATION_PARTS.copy_into(&mut tx, WORKORDER_PARTS, id.0, workorder_id.0).await?;
        tx.commit().await?;

        info!(
            event_name = "quotation.converted",
            quotation_id = id.0,
            workorder_id = workorder_id.0,
            workorder_number = %number,
            services,
            parts,
            "quotation converted to work order"
        );
        Ok(ConversionResult { workorder_id, from_quotation: quotation.number })
    }
}

fn ensure_convertible(quotation: &Quotation) -> Result<VehicleId, RepositoryError> {
    if quotation.status != QuotationStatus::Approved {
        return Err(RepositoryError::Rejected(format!(
            "quotation must be in APPROVED state (current: {})",
            quotation.status
        )));
    }
    quotation.vehicle.ok_or_else(|| {
        RepositoryError::Rejected("quotation has no vehicle; a work order requires one".to_owned())
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use workshop_core::config::WorkflowConfig;
    use workshop_core::domain::catalog::{PartDraft, ServiceDraft};
    use workshop_core::domain::customer::{CustomerDraft, CustomerId};
    use workshop_core::domain::line_item::{LineItemInput, LineKind};
    use workshop_core::domain::quotation::{QuotationDraft, QuotationPatch, QuotationStatus};
    use workshop_core::domain::vehicle::{VehicleDraft, VehicleId};

    use super::{QuotationFilter, SqlQuotationRepository};
    use crate::repositories::test_support::pool;
    use crate::repositories::{
        PageRequest, RepositoryError, SqlCatalogRepository, SqlCustomerRepository, SqlVehicleRepository,
    };
    use crate::DbPool;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("decimal literal")
    }

    fn workflow(enforce_transitions: bool) -> WorkflowConfig {
        WorkflowConfig { enforce_transitions, number_retry_attempts: 3 }
    }

    struct Fixture {
        customer: CustomerId,
        vehicle: VehicleId,
        service: i64,
        part: i64,
    }

    async fn fixture(pool: &DbPool) -> Fixture {
        let customer = SqlCustomerRepository::new(pool.clone())
            .create(CustomerDraft { name: "Ana Pérez".to_owned(), ..CustomerDraft::default() })
            .await
            .expect("customer");
        let vehicle = SqlVehicleRepository::new(pool.clone())
            .create(VehicleDraft {
                owner: customer.id,
                plate: "ABC-123".to_owned(),
                vin: None,
                brand: "Toyota".to_owned(),
                model: "Corolla".to_owned(),
                year: 2018,
                color: None,
                mileage_km: 80_000,
            })
            .await
            .expect("vehicle");
        let catalog = SqlCatalogRepository::new(pool.clone());
        let service = catalog
            .create_service(ServiceDraft {
                code: "SRV-OIL".to_owned(),
                name: "Cambio de aceite".to_owned(),
                description: String::new(),
                labor_minutes: 30,
                price: dec("50"),
                is_active: true,
            })
            .await
            .expect("service");
        let part = catalog
            .create_part(PartDraft {
                sku: "FLT-01".to_owned(),
                name: "Filtro".to_owned(),
                unit: "UNI".to_owned(),
                stock: dec("10"),
                cost: dec("12"),
                price: dec("20"),
                is_active: true,
            })
            .await
            .expect("part");

        Fixture { customer: customer.id, vehicle: vehicle.id, service: service.id.0, part: part.id.0 }
    }

    fn draft(fixture: &Fixture) -> QuotationDraft {
        QuotationDraft {
            number: None,
            status: None,
            customer: fixture.customer,
            vehicle: Some(fixture.vehicle),
            notes: String::new(),
            valid_until: None,
            discount_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
        }
    }

    fn line(catalog_id: i64, quantity: &str, unit_price: &str, discount: &str) -> LineItemInput {
        LineItemInput {
            id: None,
            catalog_id,
            quantity: dec(quantity),
            unit_price: dec(unit_price),
            discount: dec(discount),
        }
    }

    async fn workorder_count(pool: &DbPool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM workorder").fetch_one(pool).await.expect("count")
    }

    #[tokio::test]
    async fn numbers_follow_each_other_within_a_year() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let repo = SqlQuotationRepository::new(pool, workflow(false));

        let first = repo.create(draft(&fixture), vec![], vec![]).await.expect("first");
        let second = repo.create(draft(&fixture), vec![], vec![]).await.expect("second");

        let year = chrono::Utc::now().format("%Y").to_string();
        assert_eq!(first.quotation.number, format!("Q-{year}-0001"));
        assert_eq!(second.quotation.number, format!("Q-{year}-0002"));
        assert_eq!(first.quotation.status, QuotationStatus::Draft);
    }

    #[tokio::test]
    async fn create_computes_totals_from_nested_lines() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let repo = SqlQuotationRepository::new(pool, workflow(false));
        let mut header = draft(&fixture);
        header.discount_total = dec("5");
        header.tax_total = dec("10.005");

        let detail = repo
            .create(
                header,
                vec![line(fixture.service, "2", "50", "10")],
                vec![line(fixture.part, "1", "20", "0")],
            )
            .await
            .expect("create");

        let totals = &detail.quotation.totals;
        assert_eq!(totals.subtotal_services, dec("90.00"));
        assert_eq!(totals.subtotal_parts, dec("20.00"));
        assert_eq!(totals.tax_total.to_string(), "10.01");
        assert_eq!(totals.grand_total, dec("115.01"));
        assert_eq!(detail.services.len(), 1);
        assert_eq!(detail.parts.len(), 1);
    }

    #[tokio::test]
    async fn vehicle_of_another_customer_is_rejected_under_vehicle() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let other = SqlCustomerRepository::new(pool.clone())
            .create(CustomerDraft { name: "Bruno".to_owned(), ..CustomerDraft::default() })
            .await
            .expect("other customer");
        let repo = SqlQuotationRepository::new(pool, workflow(false));

        let mut header = draft(&fixture);
        header.customer = other.id;
        let error = repo.create(header, vec![], vec![]).await.expect_err("owner mismatch");
        assert!(matches!(error, RepositoryError::Domain(ref domain) if domain.field() == Some("vehicle")));
    }

    #[tokio::test]
    async fn recalculate_is_idempotent() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let repo = SqlQuotationRepository::new(pool, workflow(false));
        let detail = repo
            .create(draft(&fixture), vec![line(fixture.service, "1.5", "33.33", "0.10")], vec![])
            .await
            .expect("create");

        let once = repo.recalculate(detail.quotation.id).await.expect("first recalc");
        let twice = repo.recalculate(detail.quotation.id).await.expect("second recalc");
        assert_eq!(once.totals, twice.totals);
        assert_eq!(once.totals, detail.quotation.totals);
    }

    #[tokio::test]
    async fn line_mutations_recompute_the_parent() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let repo = SqlQuotationRepository::new(pool, workflow(false));
        let id = repo.create(draft(&fixture), vec![], vec![]).await.expect("create").quotation.id;

        let stored = repo.add_line(id, LineKind::Part, line(fixture.part, "3", "20", "0")).await.expect("add");
        assert_eq!(repo.get(id).await.expect("get").quotation.totals.grand_total, dec("60.00"));

        repo.update_line(id, LineKind::Part, stored.id, line(fixture.part, "1", "20", "0"))
            .await
            .expect("update");
        assert_eq!(repo.get(id).await.expect("get").quotation.totals.subtotal_parts, dec("20.00"));

        repo.delete_line(id, LineKind::Part, stored.id).await.expect("delete");
        assert_eq!(repo.get(id).await.expect("get").quotation.totals.grand_total, dec("0.00"));
    }

    #[tokio::test]
    async fn failed_recompute_keeps_the_line() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let repo = SqlQuotationRepository::new(pool.clone(), workflow(false));
        let id = repo.create(draft(&fixture), vec![], vec![]).await.expect("create").quotation.id;
        sqlx::query(
            "CREATE TRIGGER block_totals BEFORE UPDATE OF grand_total ON quotation
             BEGIN SELECT RAISE(ABORT, 'totals are frozen'); END",
        )
        .execute(&pool)
        .await
        .expect("trigger");

        repo.add_line(id, LineKind::Service, line(fixture.service, "1", "50", "0"))
            .await
            .expect("line is kept");

        let detail = repo.get(id).await.expect("get");
        assert_eq!(detail.services.len(), 1);
        assert_eq!(detail.quotation.totals.grand_total, dec("0.00"));
    }

    #[tokio::test]
    async fn invalid_line_is_rejected_before_writing() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let repo = SqlQuotationRepository::new(pool, workflow(false));
        let id = repo.create(draft(&fixture), vec![], vec![]).await.expect("create").quotation.id;

        let error = repo
            .add_line(id, LineKind::Service, line(fixture.service, "1", "10", "11"))
            .await
            .expect_err("discount over subtotal");
        assert!(matches!(error, RepositoryError::Domain(ref domain) if domain.field() == Some("discount")));
        assert!(repo.get(id).await.expect("get").services.is_empty());
    }

    #[tokio::test]
    async fn patch_replaces_lines_by_diff() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let repo = SqlQuotationRepository::new(pool, workflow(false));
        let detail = repo
            .create(
                draft(&fixture),
                vec![line(fixture.service, "1", "50", "0"), line(fixture.service, "2", "50", "0")],
                vec![line(fixture.part, "1", "20", "0")],
            )
            .await
            .expect("create");
        let keep = detail.services[0].id;

        let mut kept = line(fixture.service, "4", "50", "0");
        kept.id = Some(keep);
        let patch = QuotationPatch {
            notes: Some("cliente frecuente".to_owned()),
            services: Some(vec![kept]),
            ..QuotationPatch::default()
        };
        let updated = repo.update(detail.quotation.id, patch).await.expect("update");

        assert_eq!(updated.quotation.notes, "cliente frecuente");
        assert_eq!(updated.services.len(), 1);
        assert_eq!(updated.services[0].id, keep);
        assert_eq!(updated.parts.len(), 1, "absent collection is untouched");
        assert_eq!(updated.quotation.totals.grand_total, dec("220.00"));
    }

    #[tokio::test]
    async fn enforced_transitions_block_draft_to_approved() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let permissive = SqlQuotationRepository::new(pool.clone(), workflow(false));
        let strict = SqlQuotationRepository::new(pool, workflow(true));
        let id = permissive.create(draft(&fixture), vec![], vec![]).await.expect("create").quotation.id;

        let error = strict.approve(id).await.expect_err("draft -> approved");
        assert!(matches!(error, RepositoryError::Domain(_)));

        strict.send(id).await.expect("draft -> sent");
        assert_eq!(strict.approve(id).await.expect("sent -> approved").status, QuotationStatus::Approved);
        assert_eq!(permissive.set_status(id, "DRAFT").await.expect("set").status, QuotationStatus::Draft);

        let error = permissive.set_status(id, "ARCHIVED").await.expect_err("unknown");
        assert!(matches!(error, RepositoryError::Rejected(_)));
    }

    #[tokio::test]
    async fn conversion_copies_lines_of_an_approved_quotation() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let repo = SqlQuotationRepository::new(pool.clone(), workflow(false));
        let detail = repo
            .create(
                draft(&fixture),
                vec![line(fixture.service, "1", "50", "0")],
                vec![line(fixture.part, "1", "20", "0")],
            )
            .await
            .expect("create");
        let id = detail.quotation.id;

        let error = repo.convert_to_workorder(id).await.expect_err("draft cannot convert");
        assert!(matches!(error, RepositoryError::Rejected(_)));
        assert_eq!(workorder_count(&pool).await, 0);

        repo.approve(id).await.expect("approve");
        let result = repo.convert_to_workorder(id).await.expect("convert");
        assert_eq!(result.from_quotation, detail.quotation.number);

        let (status, notes): (String, String) =
            sqlx::query_as("SELECT status, notes FROM workorder WHERE id = ?")
                .bind(result.workorder_id.0)
                .fetch_one(&pool)
                .await
                .expect("workorder");
        assert_eq!(status, "OPEN");
        assert_eq!(notes, format!("Generated from quotation {}", detail.quotation.number));

        let copied: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT service_id, quantity, unit_price FROM workorder_service WHERE workorder_id = ?",
        )
        .bind(result.workorder_id.0)
        .fetch_all(&pool)
        .await
        .expect("lines");
        assert_eq!(copied, vec![(fixture.service, "1.00".to_owned(), "50.00".to_owned())]);
    }

    #[tokio::test]
    async fn approved_quotation_without_vehicle_cannot_convert() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let repo = SqlQuotationRepository::new(pool.clone(), workflow(false));
        let mut header = draft(&fixture);
        header.vehicle = None;
        let id = repo.create(header, vec![], vec![]).await.expect("create").quotation.id;
        repo.approve(id).await.expect("approve");

        let error = repo.convert_to_workorder(id).await.expect_err("no vehicle");
        assert!(matches!(&error, RepositoryError::Rejected(message) if message.contains("no vehicle")));
        assert_eq!(workorder_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn failed_conversion_leaves_no_work_order() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let repo = SqlQuotationRepository::new(pool.clone(), workflow(false));
        let id = repo
            .create(draft(&fixture), vec![], vec![line(fixture.part, "1", "20", "0")])
            .await
            .expect("create")
            .quotation
            .id;
        repo.approve(id).await.expect("approve");
        sqlx::query(
            "CREATE TRIGGER block_parts BEFORE INSERT ON workorder_part
             BEGIN SELECT RAISE(ABORT, 'no parts today'); END",
        )
        .execute(&pool)
        .await
        .expect("trigger");

        repo.convert_to_workorder(id).await.expect_err("copy fails");
        assert_eq!(workorder_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn list_searches_number_customer_and_plate() {
        let pool = pool().await;
        let fixture = fixture(&pool).await;
        let repo = SqlQuotationRepository::new(pool, workflow(false));
        let first = repo.create(draft(&fixture), vec![], vec![]).await.expect("first");
        let mut without_vehicle = draft(&fixture);
        without_vehicle.vehicle = None;
        let second = repo.create(without_vehicle, vec![], vec![]).await.expect("second");

        let all = repo.list(&QuotationFilter::default(), PageRequest::default()).await.expect("list");
        assert_eq!(all.count, 2);
        assert_eq!(all.results[0].quotation.id, second.quotation.id, "newest first");

        let by_plate = QuotationFilter { search: Some("abc-1".to_owned()), ..QuotationFilter::default() };
        let page = repo.list(&by_plate, PageRequest::default()).await.expect("plate");
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].quotation.id, first.quotation.id);

        let by_customer = QuotationFilter { search: Some("pérez".to_owned()), ..QuotationFilter::default() };
        assert_eq!(repo.list(&by_customer, PageRequest::default()).await.expect("name").count, 2);
    }
}
