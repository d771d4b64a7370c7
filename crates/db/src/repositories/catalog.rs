use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::info;

use workshop_core::domain::catalog::{Part, PartDraft, PartId, Service, ServiceDraft, ServiceId};

use super::{decode_err, get_decimal, get_u32, like_pattern, Page, PageRequest, RepositoryError};
use crate::DbPool;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    /// Matches code/sku or name.
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

/// Services and parts. Both tables are protected while any quotation or work
/// order line references a row.
#[derive(Clone)]
pub struct SqlCatalogRepository {
    pool: DbPool,
}

const SERVICE_COLUMNS: &str = "id, code, name, description, labor_minutes, price, is_active";
const PART_COLUMNS: &str = "id, sku, name, unit, stock, cost, price, is_active";

fn row_to_service(row: &SqliteRow) -> Result<Service, RepositoryError> {
    Ok(Service {
        id: ServiceId(row.try_get("id").map_err(decode_err)?),
        code: row.try_get("code").map_err(decode_err)?,
        name: row.try_get("name").map_err(decode_err)?,
        description: row.try_get("description").map_err(decode_err)?,
        labor_minutes: get_u32(row, "labor_minutes")?,
        price: get_decimal(row, "price")?,
        is_active: row.try_get("is_active").map_err(decode_err)?,
    })
}

fn row_to_part(row: &SqliteRow) -> Result<Part, RepositoryError> {
    Ok(Part {
        id: PartId(row.try_get("id").map_err(decode_err)?),
        sku: row.try_get("sku").map_err(decode_err)?,
        name: row.try_get("name").map_err(decode_err)?,
        unit: row.try_get("unit").map_err(decode_err)?,
        stock: get_decimal(row, "stock")?,
        cost: get_decimal(row, "cost")?,
        price: get_decimal(row, "price")?,
        is_active: row.try_get("is_active").map_err(decode_err)?,
    })
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, key_column: &str, filter: &CatalogFilter) {
    builder.push(" WHERE 1=1");
    if let Some(active) = filter.is_active {
        builder.push(" AND is_active = ");
        builder.push_bind(active);
    }
    if let Some(term) = filter.search.as_deref().filter(|term| !term.trim().is_empty()) {
        let pattern = like_pattern(term);
        builder.push(format!(" AND ({key_column} LIKE "));
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR name LIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn count(&self, table: &str, key_column: &str, filter: &CatalogFilter) -> Result<i64, RepositoryError> {
        let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {table}"));
        push_filters(&mut count, key_column, filter);
        Ok(count.build_query_scalar().fetch_one(&self.pool).await?)
    }

    pub async fn list_services(
        &self,
        filter: &CatalogFilter,
        page: PageRequest,
    ) -> Result<Page<Service>, RepositoryError> {
        let total = self.count("service", "code", filter).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {SERVICE_COLUMNS} FROM service"));
        push_filters(&mut select, "code", filter);
        select.push(" ORDER BY code ASC LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());
        let rows = select.build().fetch_all(&self.pool).await?;

        Ok(Page {
            count: total,
            page: page.page,
            page_size: page.page_size,
            results: rows.iter().map(row_to_service).collect::<Result<Vec<_>, _>>()?,
        })
    }

    pub async fn get_service(&self, id: ServiceId) -> Result<Service, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SERVICE_COLUMNS} FROM service WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref()
            .map(row_to_service)
            .transpose()?
            .ok_or_else(|| RepositoryError::not_found("service", id.0))
    }

    pub async fn create_service(&self, draft: ServiceDraft) -> Result<Service, RepositoryError> {
        let draft = draft.prepare()?;
        let result = sqlx::query(
            "INSERT INTO service (code, name, description, labor_minutes, price, is_active)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&draft.code)
        .bind(draft.name.trim())
        .bind(&draft.description)
        .bind(i64::from(draft.labor_minutes))
        .bind(draft.price.to_string())
        .bind(draft.is_active)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::classify)?;

        let id = ServiceId(result.last_insert_rowid());
        info!(event_name = "catalog.service_created", service_id = id.0, code = %draft.code, "service created");
        self.get_service(id).await
    }

    pub async fn update_service(&self, id: ServiceId, draft: ServiceDraft) -> Result<Service, RepositoryError> {
        let draft = draft.prepare()?;
        let result = sqlx::query(
            "UPDATE service SET code = ?, name = ?, description = ?, labor_minutes = ?, price = ?,
                                is_active = ?
             WHERE id = ?",
        )
        .bind(&draft.code)
        .bind(draft.name.trim())
        .bind(&draft.description)
        .bind(i64::from(draft.labor_minutes))
        .bind(draft.price.to_string())
        .bind(draft.is_active)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::classify)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("service", id.0));
        }
        self.get_service(id).await
    }

    pub async fn delete_service(&self, id: ServiceId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM service WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::classify_delete)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("service", id.0));
        }
        info!(event_name = "catalog.service_deleted", service_id = id.0, "service deleted");
        Ok(())
    }

    pub async fn list_parts(
        &self,
        filter: &CatalogFilter,
        page: PageRequest,
    ) -> Result<Page<Part>, RepositoryError> {
        let total = self.count("part", "sku", filter).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {PART_COLUMNS} FROM part"));
        push_filters(&mut select, "sku", filter);
        select.push(" ORDER BY sku ASC LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());
        let rows = select.build().fetch_all(&self.pool).await?;

        Ok(Page {
            count: total,
            page: page.page,
            page_size: page.page_size,
            results: rows.iter().map(row_to_part).collect::<Result<Vec<_>, _>>()?,
        })
    }

    pub async fn get_part(&self, id: PartId) -> Result<Part, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PART_COLUMNS} FROM part WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_part).transpose()?.ok_or_else(|| RepositoryError::not_found("part", id.0))
    }

    pub async fn create_part(&self, draft: PartDraft) -> Result<Part, RepositoryError> {
        let draft = draft.prepare()?;
        let result = sqlx::query(
            "INSERT INTO part (sku, name, unit, stock, cost, price, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&draft.sku)
        .bind(draft.name.trim())
        .bind(draft.unit.trim())
        .bind(draft.stock.to_string())
        .bind(draft.cost.to_string())
        .bind(draft.price.to_string())
        .bind(draft.is_active)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::classify)?;

        let id = PartId(result.last_insert_rowid());
        info!(event_name = "catalog.part_created", part_id = id.0, sku = %draft.sku, "part created");
        self.get_part(id).await
    }

    pub async fn update_part(&self, id: PartId, draft: PartDraft) -> Result<Part, RepositoryError> {
        let draft = draft.prepare()?;
        let result = sqlx::query(
            "UPDATE part SET sku = ?, name = ?, unit = ?, stock = ?, cost = ?, price = ?, is_active = ?
             WHERE id = ?",
        )
        .bind(&draft.sku)
        .bind(draft.name.trim())
        .bind(draft.unit.trim())
        .bind(draft.stock.to_string())
        .bind(draft.cost.to_string())
        .bind(draft.price.to_string())
        .bind(draft.is_active)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::classify)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("part", id.0));
        }
        self.get_part(id).await
    }

    pub async fn delete_part(&self, id: PartId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM part WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::classify_delete)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("part", id.0));
        }
        info!(event_name = "catalog.part_deleted", part_id = id.0, "part deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use workshop_core::domain::catalog::{PartDraft, ServiceDraft};

    use super::{CatalogFilter, SqlCatalogRepository};
    use crate::repositories::test_support::pool;
    use crate::repositories::{PageRequest, RepositoryError};

    fn service(code: &str, active: bool) -> ServiceDraft {
        ServiceDraft {
            code: code.to_owned(),
            name: format!("Servicio {code}"),
            description: String::new(),
            labor_minutes: 45,
            price: Decimal::from_str("50").expect("decimal"),
            is_active: active,
        }
    }

    #[tokio::test]
    async fn services_filter_by_activity_and_search() {
        let repo = SqlCatalogRepository::new(pool().await);
        repo.create_service(service("SRV-OIL", true)).await.expect("oil");
        repo.create_service(service("SRV-OLD", false)).await.expect("old");

        let active = CatalogFilter { search: None, is_active: Some(true) };
        let page = repo.list_services(&active, PageRequest::default()).await.expect("list");
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].code, "SRV-OIL");
        assert_eq!(page.results[0].price.to_string(), "50.00");

        let search = CatalogFilter { search: Some("old".to_owned()), is_active: None };
        let page = repo.list_services(&search, PageRequest::default()).await.expect("search");
        assert_eq!(page.results.len(), 1);
        assert!(!page.results[0].is_active);
    }

    #[tokio::test]
    async fn duplicate_sku_is_a_sku_error() {
        let repo = SqlCatalogRepository::new(pool().await);
        let part = PartDraft {
            sku: "FLT-01".to_owned(),
            name: "Filtro de aceite".to_owned(),
            unit: String::new(),
            stock: Decimal::from(10),
            cost: Decimal::from(8),
            price: Decimal::from(20),
            is_active: true,
        };
        let created = repo.create_part(part.clone()).await.expect("create");
        assert_eq!(created.unit, "UNI");

        let error = repo.create_part(part).await.expect_err("duplicate");
        assert!(error.is_unique_violation_on("sku"));
    }

    #[tokio::test]
    async fn service_used_by_a_line_is_protected() {
        let pool = pool().await;
        let repo = SqlCatalogRepository::new(pool.clone());
        let srv = repo.create_service(service("SRV-OIL", true)).await.expect("service");
        sqlx::raw_sql(
            "INSERT INTO customer (id, name, created_at, updated_at) VALUES (1, 'Ana', 'x', 'x');
             INSERT INTO quotation (id, number, customer_id, created_at, updated_at)
                 VALUES (1, 'Q-2026-0001', 1, 'x', 'x');",
        )
        .execute(&pool)
        .await
        .expect("seed");
        sqlx::query("INSERT INTO quotation_service (quotation_id, service_id, quantity, unit_price) VALUES (1, ?, '1.00', '50.00')")
            .bind(srv.id.0)
            .execute(&pool)
            .await
            .expect("line");

        let error = repo.delete_service(srv.id).await.expect_err("protected");
        assert!(matches!(error, RepositoryError::Protected(_)));
        repo.get_service(srv.id).await.expect("still there");
    }
}
