use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::info;

use workshop_core::domain::customer::{Customer, CustomerDraft, CustomerId};

use super::{decode_err, get_timestamp, like_pattern, timestamp, Page, PageRequest, RepositoryError};
use crate::DbPool;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerFilter {
    /// Matches name, phone or email.
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct SqlCustomerRepository {
    pool: DbPool,
}

const COLUMNS: &str = "id, name, phone, email, address, created_at, updated_at";

fn row_to_customer(row: &SqliteRow) -> Result<Customer, RepositoryError> {
    Ok(Customer {
        id: CustomerId(row.try_get("id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        phone: row.try_get("phone").map_err(decode_err)?,
        email: row.try_get("email").map_err(decode_err)?,
        address: row.try_get("address").map_err(decode_err)?,
        created_at: get_timestamp(row, "created_at")?,
        updated_at: get_timestamp(row, "updated_at")?,
    })
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &CustomerFilter) {
    builder.push(" WHERE 1=1");
    if let Some(term) = filter.search.as_deref().filter(|term| !term.trim().is_empty()) {
        let pattern = like_pattern(term);
        builder.push(" AND (name LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR phone LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR email LIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> Result<Page<Customer>, RepositoryError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM customer");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM customer"));
        push_filters(&mut select, filter);
        select.push(" ORDER BY name ASC, id ASC LIMIT ");
        select.push_bind(page.limit());
        select.push(" OFFSET ");
        select.push_bind(page.offset());
        let rows = select.build().fetch_all(&self.pool).await?;

        Ok(Page {
            count: total,
            page: page.page,
            page_size: page.page_size,
            results: rows.iter().map(row_to_customer).collect::<Result<Vec<_>, _>>()?,
        })
    }

    pub async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM customer WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_customer).transpose()
    }

    pub async fn get(&self, id: CustomerId) -> Result<Customer, RepositoryError> {
        self.find_by_id(id).await?.ok_or_else(|| RepositoryError::not_found("customer", id.0))
    }

    pub async fn create(&self, draft: CustomerDraft) -> Result<Customer, RepositoryError> {
        draft.validate()?;
        let now = timestamp(Utc::now());

        let result = sqlx::query(
            "INSERT INTO customer (name, phone, email, address, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(draft.name.trim())
        .bind(draft.phone.trim())
        .bind(draft.email.trim())
        .bind(draft.address.trim())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::classify)?;

        let id = CustomerId(result.last_insert_rowid());
        info!(event_name = "customer.created", customer_id = id.0, "customer created");
        self.get(id).await
    }

    pub async fn update(&self, id: CustomerId, draft: CustomerDraft) -> Result<Customer, RepositoryError> {
        draft.validate()?;

        let result = sqlx::query(
            "UPDATE customer SET name = ?, phone = ?, email = ?, address = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(draft.name.trim())
        .bind(draft.phone.trim())
        .bind(draft.email.trim())
        .bind(draft.address.trim())
        .bind(timestamp(Utc::now()))
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::classify)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("customer", id.0));
        }
        self.get(id).await
    }

    /// Fails with `Protected` while vehicles, quotations or work orders reference the customer.
    pub async fn delete(&self, id: CustomerId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM customer WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::classify_delete)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("customer", id.0));
        }
        info!(event_name = "customer.deleted", customer_id = id.0, "customer deleted");
        Ok(())
    }

    pub async fn exists(&self, id: CustomerId) -> Result<bool, RepositoryError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM customer WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}
