use chrono::{Datelike, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::{info, warn};

use workshop_core::domain::customer::CustomerId;
use workshop_core::domain::line_item::{LineItemInput, LineKind, PreparedLine};
use workshop_core::domain::vehicle::VehicleId;
use workshop_core::domain::workorder::{
    closed_at_for, WorkOrder, WorkOrderDraft, WorkOrderId, WorkOrderStatus, WORKORDER_NUMBER_PREFIX,
};
use workshop_core::errors::DomainError;

use super::lines::{prepare_all, WORKORDER_PARTS, WORKORDER_SERVICES};
use super::numbering::allocate_number;
use super::{
    begin_write, decode_err, get_optional_timestamp, get_timestamp, like_pattern, timestamp, Page,
    PageRequest, RepositoryError,
};
use crate::DbPool;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkOrderFilter {
    pub status: Option<WorkOrderStatus>,
    pub customer: Option<CustomerId>,
    pub vehicle: Option<VehicleId>,
    /// Matches the work order number or the vehicle plate.
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct SqlWorkOrderRepository {
    pool: DbPool,
    number_retry_attempts: u32,
}

const COLUMNS: &str = "w.id, w.number, w.customer_id, w.vehicle_id, w.status, w.complaint,
    w.diagnosis, w.notes, w.opened_at, w.closed_at";

fn row_to_workorder(row: &SqliteRow) -> Result<WorkOrder, RepositoryError> {
    let status: String = row.try_get("status").map_err(decode_err)?;
    Ok(WorkOrder {
        id: WorkOrderId(row.try_get("id").map_err(decode_err)?),
        number: row.try_get("number").map_err(decode_err)?,
        customer: CustomerId(row.try_get("customer_id").map_err(decode_err)?),
        vehicle: VehicleId(row.try_get("vehicle_id").map_err(decode_err)?),
        status: status
            .parse()
            .map_err(|error: DomainError| RepositoryError::Decode(error.to_string()))?,
        complaint: row.try_get("complaint").map_err(decode_err)?,
        diagnosis: row.try_get("diagnosis").map_err(decode_err)?,
        notes: row.try_get("notes").map_err(decode_err)?,
        opened_at: get_timestamp(row, "opened_at")?,
        closed_at: get_optional_timestamp(row, "closed_at")?,
        services: Vec::new(),
        parts: Vec::new(),
    })
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &WorkOrderFilter) {
    builder.push(" FROM workorder w JOIN vehicle v ON v.id = w.vehicle_id WHERE 1=1");
    if let Some(status) = filter.status {
        builder.push(" AND w.status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(customer) = filter.customer {
        builder.push(" AND w.customer_id = ");
        builder.push_bind(customer.0);
    }
    if let Some(vehicle) = filter.vehicle {
        builder.push(" AND w.vehicle_id = ");
        builder.push_bind(vehicle.0);
    }
    if let Some(term) = filter.search.as_deref().filter(|term| !term.trim().is_empty()) {
        let pattern = like_pattern(term);
        builder.push(" AND (w.number LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR v.plate LIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }
}

async fn load(conn: &mut SqliteConnection, id: WorkOrderId) -> Result<Option<WorkOrder>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM workorder w WHERE w.id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(Some(with_lines(conn, row_to_workorder(&row)?).await?)),
        None => Ok(None),
    }
}

async fn with_lines(
    conn: &mut SqliteConnection,
    mut workorder: WorkOrder,
) -> Result<WorkOrder, RepositoryError> {
    workorder.services = WORKORDER_SERVICES.load(conn, workorder.id.0).await?;
    workorder.parts = WORKORDER_PARTS.load(conn, workorder.id.0).await?;
    Ok(workorder)
}

impl SqlWorkOrderRepository {
    pub fn new(pool: DbPool, number_retry_attempts: u32) -> Self {
        Self { pool, number_retry_attempts }
    }

    pub async fn list(
        &self,
        filter: &WorkOrderFilter,
        page: PageRequest,
    ) -> Result<Page<WorkOrder>, RepositoryError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS}"));
        push_filters(&mut select, filter);
        select.push(" ORDER BY w.opened_at DESC, w.id DESC LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());
        let rows = select.build().fetch_all(&self.pool).await?;

        let mut conn = self.pool.acquire().await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(with_lines(&mut conn, row_to_workorder(row)?).await?);
        }

        Ok(Page { count: total, page: page.page, page_size: page.page_size, results })
    }

    pub async fn find(&self, id: WorkOrderId) -> Result<Option<WorkOrder>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load(&mut conn, id).await
    }

    pub async fn get(&self, id: WorkOrderId) -> Result<WorkOrder, RepositoryError> {
        self.find(id).await?.ok_or_else(|| RepositoryError::not_found("workorder", id.0))
    }

    async fn validate_refs(&self, draft: &WorkOrderDraft) -> Result<(), RepositoryError> {
        if let Some(number) = &draft.number {
            if number.chars().count() > 20 {
                return Err(DomainError::validation(
                    "number",
                    "ensure this field has no more than 20 characters",
                )
                .into());
            }
        }
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
        let vehicle: Option<i64> = sqlx::query_scalar("SELECT id FROM vehicle WHERE id = ?")
            .bind(draft.vehicle.0)
            .fetch_optional(&self.pool)
            .await?;
        if vehicle.is_none() {
            return Err(DomainError::validation(
                "vehicle",
                format!("invalid pk \"{}\" - object does not exist", draft.vehicle.0),
            )
            .into());
        }
        Ok(())
    }

    /// Opens a work order. Without an explicit number the next `WO-<year>-NNNN`
    /// is allocated the same way quotation numbers are.
    pub async fn create(
        &self,
        draft: WorkOrderDraft,
        services: Vec<LineItemInput>,
        parts: Vec<LineItemInput>,
    ) -> Result<WorkOrder, RepositoryError> {
        self.validate_refs(&draft).await?;
        let services = prepare_all(services, LineKind::Service)?;
        let parts = prepare_all(parts, LineKind::Part)?;
        let explicit_number = draft.number.as_deref().map(str::trim).filter(|number| !number.is_empty());

        let attempts = self.number_retry_attempts.max(1);
        for attempt in 1..=attempts {
            match self.try_create(&draft, explicit_number, &services, &parts).await {
                Err(error) if explicit_number.is_none() && error.is_unique_violation_on("number") => {
                    warn!(
                        event_name = "workorder.number_collision",
                        attempt,
                        max_attempts = attempts,
                        "work order number already taken, retrying"
                    );
                }
                Ok(id) => return self.get(id).await,
                Err(error) => return Err(error),
            }
        }

        Err(RepositoryError::Conflict {
            message: "could not allocate a unique work order number; retry the request".to_owned(),
            retryable: true,
        })
    }

    async fn try_create(
        &self,
        draft: &WorkOrderDraft,
        explicit_number: Option<&str>,
        services: &[PreparedLine],
        parts: &[PreparedLine],
    ) -> Result<WorkOrderId, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        let number = match explicit_number {
            Some(number) => number.to_owned(),
            None => {
                allocate_number(&mut tx, "workorder", WORKORDER_NUMBER_PREFIX, Utc::now().year()).await?
            }
        };

        let now = Utc::now();
        let status = draft.status.unwrap_or(WorkOrderStatus::Open);
        let result = sqlx::query(
            "INSERT INTO workorder (number, customer_id, vehicle_id, status, complaint, diagnosis,
                                   notes, opened_at, closed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&number)
        .bind(draft.customer.0)
        .bind(draft.vehicle.0)
        .bind(status.as_str())
        .bind(&draft.complaint)
        .bind(&draft.diagnosis)
        .bind(&draft.notes)
        .bind(timestamp(now))
        .bind(closed_at_for(None, status, now).map(timestamp))
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::classify)?;
        let id = WorkOrderId(result.last_insert_rowid());

        for line in services {
            WORKORDER_SERVICES.insert(&mut tx, id.0, line).await?;
        }
        for line in parts {
            WORKORDER_PARTS.insert(&mut tx, id.0, line).await?;
        }
        tx.commit().await?;

        info!(event_name = "workorder.created", workorder_id = id.0, number = %number, "work order created");
        Ok(id)
    }

    /// Replaces the header; line collections that are present are synced by diff.
    /// `closed_at` follows the status.
    pub async fn update(
        &self,
        id: WorkOrderId,
        draft: WorkOrderDraft,
        services: Option<Vec<LineItemInput>>,
        parts: Option<Vec<LineItemInput>>,
    ) -> Result<WorkOrder, RepositoryError> {
        let current = self.get(id).await?;
        self.validate_refs(&draft).await?;
        let services = services.map(|lines| prepare_all(lines, LineKind::Service)).transpose()?;
        let parts = parts.map(|lines| prepare_all(lines, LineKind::Part)).transpose()?;

        let number = draft
            .number
            .as_deref()
            .map(str::trim)
            .filter(|number| !number.is_empty())
            .unwrap_or(current.number.as_str())
            .to_owned();
        let status = draft.status.unwrap_or(current.status);
        let closed_at = closed_at_for(Some((current.status, current.closed_at)), status, Utc::now());

        let mut tx = begin_write(&self.pool).await?;
        let result = sqlx::query(
            "UPDATE workorder
             SET number = ?, customer_id = ?, vehicle_id = ?, status = ?, complaint = ?,
                 diagnosis = ?, notes = ?, closed_at = ?
             WHERE id = ?",
        )
        .bind(&number)
        .bind(draft.customer.0)
        .bind(draft.vehicle.0)
        .bind(status.as_str())
        .bind(&draft.complaint)
        .bind(&draft.diagnosis)
        .bind(&draft.notes)
        .bind(closed_at.map(timestamp))
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::classify)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("workorder", id.0));
        }

        if let Some(services) = &services {
            WORKORDER_SERVICES.sync(&mut tx, id.0, services).await?;
        }
        if let Some(parts) = &parts {
            WORKORDER_PARTS.sync(&mut tx, id.0, parts).await?;
        }
        tx.commit().await?;

        if status != current.status {
            info!(
                event_name = "workorder.status_changed",
                workorder_id = id.0,
                from = current.status.as_str(),
                to = status.as_str(),
                "work order status changed"
            );
        }
        self.get(id).await
    }

    pub async fn delete(&self, id: WorkOrderId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM workorder WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::classify_delete)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("workorder", id.0));
        }
        info!(event_name = "workorder.deleted", workorder_id = id.0, "work order deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use workshop_core::domain::customer::CustomerId;
    use workshop_core::domain::line_item::LineItemInput;
    use workshop_core::domain::vehicle::VehicleId;
    use workshop_core::domain::workorder::{WorkOrderDraft, WorkOrderStatus};

    use super::{SqlWorkOrderRepository, WorkOrderFilter};
    use crate::repositories::test_support::pool;
    use crate::repositories::{PageRequest, RepositoryError};
    use crate::DbPool;

    async fn seed(pool: &DbPool) {
        sqlx::raw_sql(
            "INSERT INTO customer (id, name, created_at, updated_at) VALUES (1, 'Ana', 'x', 'x');
             INSERT INTO vehicle (id, owner_id, plate, brand, model, year, created_at, updated_at)
                 VALUES (1, 1, 'ABC123', 'Toyota', 'Yaris', 2019, 'x', 'x');
             INSERT INTO service (id, code, name, price) VALUES (1, 'SRV-1', 'Diagnóstico', '30.00');",
        )
        .execute(pool)
        .await
        .expect("seed");
    }

    fn draft() -> WorkOrderDraft {
        WorkOrderDraft {
            number: None,
            customer: CustomerId(1),
            vehicle: VehicleId(1),
            status: None,
            complaint: Some("ruido en el motor".to_owned()),
            diagnosis: None,
            notes: None,
        }
    }

    fn service_line() -> LineItemInput {
        LineItemInput {
            id: None,
            catalog_id: 1,
            quantity: Decimal::ONE,
            unit_price: Decimal::from_str("30").expect("decimal"),
            discount: Decimal::ZERO,
        }
    }

    #[tokio::test]
    async fn create_assigns_a_number_and_opens() {
        let pool = pool().await;
        seed(&pool).await;
        let repo = SqlWorkOrderRepository::new(pool, 3);

        let workorder = repo.create(draft(), vec![service_line()], vec![]).await.expect("create");
        let year = chrono::Utc::now().format("%Y").to_string();
        assert_eq!(workorder.number, format!("WO-{year}-0001"));
        assert_eq!(workorder.status, WorkOrderStatus::Open);
        assert_eq!(workorder.closed_at, None);
        assert_eq!(workorder.services.len(), 1);
    }

    #[tokio::test]
    async fn closing_stamps_closed_at_and_reopening_clears_it() {
        let pool = pool().await;
        seed(&pool).await;
        let repo = SqlWorkOrderRepository::new(pool, 3);
        let created = repo.create(draft(), vec![], vec![]).await.expect("create");

        let done = WorkOrderDraft { status: Some(WorkOrderStatus::Done), ..draft() };
        let closed = repo.update(created.id, done, None, None).await.expect("close");
        assert!(closed.closed_at.is_some());
        assert_eq!(closed.number, created.number);

        let reopen = WorkOrderDraft { status: Some(WorkOrderStatus::InProgress), ..draft() };
        let reopened = repo.update(created.id, reopen, None, None).await.expect("reopen");
        assert_eq!(reopened.closed_at, None);

        let filter = WorkOrderFilter { status: Some(WorkOrderStatus::InProgress), ..WorkOrderFilter::default() };
        assert_eq!(repo.list(&filter, PageRequest::default()).await.expect("list").count, 1);
    }

    #[tokio::test]
    async fn unknown_vehicle_is_a_vehicle_error() {
        let pool = pool().await;
        seed(&pool).await;
        let repo = SqlWorkOrderRepository::new(pool, 3);
        let error = repo
            .create(WorkOrderDraft { vehicle: VehicleId(9), ..draft() }, vec![], vec![])
            .await
            .expect_err("no vehicle");
        assert!(matches!(error, RepositoryError::Domain(ref domain) if domain.field() == Some("vehicle")));
    }
}
