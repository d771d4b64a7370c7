use sqlx::{Row, SqliteConnection};
use tracing::debug;

use workshop_core::domain::quotation::{format_number, next_sequence, number_prefix};

use super::{decode_err, RepositoryError};

/// Allocates the next `<kind>-<year>-NNNN` number for `table`.
///
/// Must run as the first write of the caller's transaction: the counter upsert
/// takes SQLite's write lock, so concurrent allocations queue behind it. The
/// counter is reconciled with the greatest stored number so numbers written by
/// hand are never reissued.
pub async fn allocate_number(
    conn: &mut SqliteConnection,
    table: &'static str,
    kind: &str,
    year: i32,
) -> Result<String, RepositoryError> {
    let prefix = number_prefix(kind, year);

    let counter: i64 = sqlx::query(
        "INSERT INTO document_sequence (prefix, last_value) VALUES (?, 0)
         ON CONFLICT(prefix) DO UPDATE SET last_value = last_value
         RETURNING last_value",
    )
    .bind(&prefix)
    .fetch_one(&mut *conn)
    .await?
    .try_get("last_value")
    .map_err(decode_err)?;

    let sql = format!(
        "SELECT number FROM {table}
         WHERE substr(number, 1, ?) = ?
         ORDER BY number DESC LIMIT 1"
    );
    let last_number: Option<String> = sqlx::query_scalar(&sql)
        .bind(prefix.chars().count() as i64)
        .bind(&prefix)
        .fetch_optional(&mut *conn)
        .await?;

    let from_counter = u32::try_from(counter.saturating_add(1)).unwrap_or(u32::MAX);
    let sequence = from_counter.max(next_sequence(last_number.as_deref()));

    sqlx::query("UPDATE document_sequence SET last_value = ? WHERE prefix = ?")
        .bind(i64::from(sequence))
        .bind(&prefix)
        .execute(&mut *conn)
        .await?;

    let number = format_number(&prefix, sequence);
    debug!(event_name = "numbering.allocated", table, number = %number, "allocated document number");
    Ok(number)
}
