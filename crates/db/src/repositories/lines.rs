//! Line rows shared by quotations and work orders.
//!
//! The four line tables have the same shape and differ only in their owner
//! and catalog columns, so one descriptor drives every query.

use std::collections::HashSet;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use workshop_core::domain::line_item::{
    LineItem, LineItemId, LineItemInput, LineKind, PreparedLine,
};
use workshop_core::errors::DomainError;

use super::{decode_err, get_decimal, RepositoryError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineTable {
    pub table: &'static str,
    pub owner_column: &'static str,
    pub kind: LineKind,
}

pub const QUOTATION_SERVICES: LineTable =
    LineTable { table: "quotation_service", owner_column: "quotation_id", kind: LineKind::Service };
pub const QUOTATION_PARTS: LineTable =
    LineTable { table: "quotation_part", owner_column: "quotation_id", kind: LineKind::Part };
pub const WORKORDER_SERVICES: LineTable =
    LineTable { table: "workorder_service", owner_column: "workorder_id", kind: LineKind::Service };
pub const WORKORDER_PARTS: LineTable =
    LineTable { table: "workorder_part", owner_column: "workorder_id", kind: LineKind::Part };

impl LineTable {
    pub fn for_quotation(kind: LineKind) -> Self {
        match kind {
            LineKind::Service => QUOTATION_SERVICES,
            LineKind::Part => QUOTATION_PARTS,
        }
    }

    pub fn for_workorder(kind: LineKind) -> Self {
        match kind {
            LineKind::Service => WORKORDER_SERVICES,
            LineKind::Part => WORKORDER_PARTS,
        }
    }

    fn catalog_column(self) -> &'static str {
        match self.kind {
            LineKind::Service => "service_id",
            LineKind::Part => "part_id",
        }
    }

    fn select_sql(self) -> String {
        format!(
            "SELECT id, {catalog} AS catalog_id, quantity, unit_price, discount FROM {table}",
            catalog = self.catalog_column(),
            table = self.table,
        )
    }

    fn decode(self, row: &SqliteRow) -> Result<LineItem, RepositoryError> {
        Ok(LineItem {
            id: LineItemId(row.try_get("id").map_err(decode_err)?),
            kind: self.kind,
            catalog_id: row.try_get("catalog_id").map_err(decode_err)?,
            quantity: get_decimal(row, "quantity")?,
            unit_price: get_decimal(row, "unit_price")?,
            discount: get_decimal(row, "discount")?,
        })
    }

    pub async fn load(
        self,
        conn: &mut SqliteConnection,
        owner_id: i64,
    ) -> Result<Vec<LineItem>, RepositoryError> {
        let sql = format!("{} WHERE {} = ? ORDER BY id ASC", self.select_sql(), self.owner_column);
        let rows = sqlx::query(&sql).bind(owner_id).fetch_all(&mut *conn).await?;
        rows.iter().map(|row| self.decode(row)).collect()
    }

    pub async fn find(
        self,
        conn: &mut SqliteConnection,
        owner_id: i64,
        line_id: LineItemId,
    ) -> Result<Option<LineItem>, RepositoryError> {
        let sql = format!("{} WHERE {} = ? AND id = ?", self.select_sql(), self.owner_column);
        let row = sqlx::query(&sql).bind(owner_id).bind(line_id.0).fetch_optional(&mut *conn).await?;
        row.as_ref().map(|row| self.decode(row)).transpose()
    }

    pub async fn insert(
        self,
        conn: &mut SqliteConnection,
        owner_id: i64,
        line: &PreparedLine,
    ) -> Result<LineItem, RepositoryError> {
        ensure_catalog_exists(conn, self.kind, line.catalog_id).await?;

        let sql = format!(
            "INSERT INTO {table} ({owner}, {catalog}, quantity, unit_price, discount)
             VALUES (?, ?, ?, ?, ?)",
            table = self.table,
            owner = self.owner_column,
            catalog = self.catalog_column(),
        );
        let result = sqlx::query(&sql)
            .bind(owner_id)
            .bind(line.catalog_id)
            .bind(line.quantity.to_string())
            .bind(line.unit_price.to_string())
            .bind(line.discount.to_string())
            .execute(&mut *conn)
            .await
            .map_err(|error| RepositoryError::classify_reference(error, self.kind.as_str()))?;

        Ok(LineItem {
            id: LineItemId(result.last_insert_rowid()),
            kind: self.kind,
            catalog_id: line.catalog_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount: line.discount,
        })
    }

    /// Returns `None` when the line does not belong to `owner_id`.
    pub async fn update(
        self,
        conn: &mut SqliteConnection,
        owner_id: i64,
        line_id: LineItemId,
        line: &PreparedLine,
    ) -> Result<Option<LineItem>, RepositoryError> {
        ensure_catalog_exists(conn, self.kind, line.catalog_id).await?;

        let sql = format!(
            "UPDATE {table} SET {catalog} = ?, quantity = ?, unit_price = ?, discount = ?
             WHERE {owner} = ? AND id = ?",
            table = self.table,
            owner = self.owner_column,
            catalog = self.catalog_column(),
        );
        let result = sqlx::query(&sql)
            .bind(line.catalog_id)
            .bind(line.quantity.to_string())
            .bind(line.unit_price.to_string())
            .bind(line.discount.to_string())
            .bind(owner_id)
            .bind(line_id.0)
            .execute(&mut *conn)
            .await
            .map_err(|error| RepositoryError::classify_reference(error, self.kind.as_str()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(LineItem {
            id: line_id,
            kind: self.kind,
            catalog_id: line.catalog_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount: line.discount,
        }))
    }

    pub async fn delete(
        self,
        conn: &mut SqliteConnection,
        owner_id: i64,
        line_id: LineItemId,
    ) -> Result<bool, RepositoryError> {
        let sql = format!("DELETE FROM {} WHERE {} = ? AND id = ?", self.table, self.owner_column);
        let result = sqlx::query(&sql).bind(owner_id).bind(line_id.0).execute(&mut *conn).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Makes the stored lines match `lines`: entries with an id update that
    /// line, entries without one are inserted, stored lines not listed are
    /// deleted. Ids that do not belong to the owner are ignored.
    pub async fn sync(
        self,
        conn: &mut SqliteConnection,
        owner_id: i64,
        lines: &[PreparedLine],
    ) -> Result<(), RepositoryError> {
        let existing: HashSet<LineItemId> =
            self.load(conn, owner_id).await?.into_iter().map(|line| line.id).collect();
        let keep: HashSet<LineItemId> = lines.iter().filter_map(|line| line.id).collect();

        for stale in existing.iter().filter(|id| !keep.contains(id)) {
            self.delete(conn, owner_id, *stale).await?;
        }

        for line in lines {
            match line.id {
                Some(id) if existing.contains(&id) => {
                    self.update(conn, owner_id, id, line).await?;
                }
                Some(_) => {}
                None => {
                    self.insert(conn, owner_id, line).await?;
                }
            }
        }

        Ok(())
    }

    /// Copies every line of `from_owner` in this table to `to_owner` in `target`
    /// without touching the values.
    pub async fn copy_into(
        self,
        conn: &mut SqliteConnection,
        target: LineTable,
        from_owner: i64,
        to_owner: i64,
    ) -> Result<u64, RepositoryError> {
        let sql = format!(
            "INSERT INTO {target} ({target_owner}, {catalog}, quantity, unit_price, discount)
             SELECT ?, {catalog}, quantity, unit_price, discount FROM {source}
             WHERE {source_owner} = ? ORDER BY id ASC",
            target = target.table,
            target_owner = target.owner_column,
            catalog = self.catalog_column(),
            source = self.table,
            source_owner = self.owner_column,
        );
        let result = sqlx::query(&sql)
            .bind(to_owner)
            .bind(from_owner)
            .execute(&mut *conn)
            .await
            .map_err(RepositoryError::classify)?;
        Ok(result.rows_affected())
    }
}

/// Validation error under `service`/`part` when the catalog row is missing.
pub async fn ensure_catalog_exists(
    conn: &mut SqliteConnection,
    kind: LineKind,
    catalog_id: i64,
) -> Result<(), RepositoryError> {
    let sql = match kind {
        LineKind::Service => "SELECT 1 FROM service WHERE id = ?",
        LineKind::Part => "SELECT 1 FROM part WHERE id = ?",
    };
    let found = sqlx::query(sql).bind(catalog_id).fetch_optional(&mut *conn).await?;
    if found.is_none() {
        return Err(DomainError::validation(
            kind.as_str(),
            format!("invalid pk \"{catalog_id}\" - object does not exist"),
        )
        .into());
    }
    Ok(())
}

pub fn prepare_all(
    inputs: Vec<LineItemInput>,
    kind: LineKind,
) -> Result<Vec<PreparedLine>, DomainError> {
    inputs.into_iter().map(|input| input.prepare(kind)).collect()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use workshop_core::domain::line_item::{LineItemId, LineKind, PreparedLine};

    use super::{QUOTATION_SERVICES, WORKORDER_SERVICES};
    use crate::repositories::test_support::pool;
    use crate::repositories::RepositoryError;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("decimal literal")
    }

    fn line(id: Option<i64>, catalog_id: i64, quantity: &str) -> PreparedLine {
        PreparedLine {
            id: id.map(LineItemId),
            kind: LineKind::Service,
            catalog_id,
            quantity: dec(quantity),
            unit_price: dec("10.00"),
            discount: dec("0.00"),
        }
    }

    async fn seed(conn: &mut sqlx::SqliteConnection) {
        sqlx::raw_sql(
            "INSERT INTO customer (id, name, created_at, updated_at) VALUES (1, 'Ana', 'x', 'x');
             INSERT INTO vehicle (id, owner_id, plate, brand, model, year, created_at, updated_at)
                 VALUES (1, 1, 'ABC123', 'Toyota', 'Yaris', 2019, 'x', 'x');
             INSERT INTO service (id, code, name, price) VALUES (1, 'SRV-1', 'Alineación', '10.00');
             INSERT INTO service (id, code, name, price) VALUES (2, 'SRV-2', 'Balanceo', '15.00');
             INSERT INTO quotation (id, number, customer_id, created_at, updated_at)
                 VALUES (1, 'Q-2026-0001', 1, 'x', 'x');
             INSERT INTO workorder (id, number, customer_id, vehicle_id, opened_at)
                 VALUES (1, 'WO-2026-0001', 1, 1, 'x');",
        )
        .execute(&mut *conn)
        .await
        .expect("seed");
    }

    #[tokio::test]
    async fn sync_updates_inserts_and_deletes_by_diff() {
        let pool = pool().await;
        let mut conn = pool.acquire().await.expect("conn");
        seed(&mut conn).await;

        let first = QUOTATION_SERVICES.insert(&mut conn, 1, &line(None, 1, "1")).await.expect("insert");
        let second = QUOTATION_SERVICES.insert(&mut conn, 1, &line(None, 2, "1")).await.expect("insert");

        QUOTATION_SERVICES
            .sync(&mut conn, 1, &[line(Some(first.id.0), 1, "3"), line(None, 2, "2"), line(Some(999), 1, "9")])
            .await
            .expect("sync");

        let lines = QUOTATION_SERVICES.load(&mut conn, 1).await.expect("load");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].id, first.id);
        assert_eq!(lines[0].quantity, dec("3"));
        assert!(lines.iter().all(|line| line.id != second.id));
    }

    #[tokio::test]
    async fn missing_catalog_row_is_a_field_error() {
        let pool = pool().await;
        let mut conn = pool.acquire().await.expect("conn");
        seed(&mut conn).await;

        let error = QUOTATION_SERVICES.insert(&mut conn, 1, &line(None, 42, "1")).await.expect_err("no service 42");
        assert!(matches!(error, RepositoryError::Domain(ref domain) if domain.field() == Some("service")));
    }

    #[tokio::test]
    async fn copy_into_keeps_values_verbatim() {
        let pool = pool().await;
        let mut conn = pool.acquire().await.expect("conn");
        seed(&mut conn).await;
        let original = QUOTATION_SERVICES.insert(&mut conn, 1, &line(None, 2, "1.50")).await.expect("insert");

        let copied = QUOTATION_SERVICES.copy_into(&mut conn, WORKORDER_SERVICES, 1, 1).await.expect("copy");
        assert_eq!(copied, 1);

        let lines = WORKORDER_SERVICES.load(&mut conn, 1).await.expect("load");
        assert_eq!(lines[0].catalog_id, original.catalog_id);
        assert_eq!(lines[0].quantity.to_string(), "1.50");
        assert_eq!(lines[0].unit_price.to_string(), "10.00");
    }
}
