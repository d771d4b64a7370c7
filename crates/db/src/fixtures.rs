use serde::Serialize;

use crate::connection::DbPool;
use crate::repositories::{begin_write, RepositoryError};

/// Quotations shipped with the demo data and the state they are seeded in.
const DEMO_QUOTATIONS: &[DemoQuotation] = &[
    DemoQuotation {
        id: 9001,
        number: "Q-DEMO-0001",
        status: "APPROVED",
        service_lines: 1,
        part_lines: 1,
        grand_total: "70.00",
        description: "Approved oil change, ready to become a work order",
    },
    DemoQuotation {
        id: 9002,
        number: "Q-DEMO-0002",
        status: "DRAFT",
        service_lines: 2,
        part_lines: 1,
        grand_total: "391.20",
        description: "Fleet brake job with discount and tax, still a draft",
    },
];

const DEMO_CUSTOMER_IDS: &[i64] = &[9001, 9002];
const DEMO_VEHICLE_IDS: &[i64] = &[9001, 9002];
const DEMO_SERVICE_IDS: &[i64] = &[9001, 9002];
const DEMO_PART_IDS: &[i64] = &[9001, 9002];

/// Deterministic demo records for local development and end-to-end checks:
/// two customers with a vehicle each, a small catalog and two quotations.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = begin_write(pool).await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(SeedResult {
            quotations: DEMO_QUOTATIONS
                .iter()
                .map(|quotation| SeededQuotation {
                    number: quotation.number,
                    status: quotation.status,
                    description: quotation.description,
                })
                .collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (label, table, ids) in [
            ("customers", "customer", DEMO_CUSTOMER_IDS),
            ("vehicles", "vehicle", DEMO_VEHICLE_IDS),
            ("services", "service", DEMO_SERVICE_IDS),
            ("parts", "part", DEMO_PART_IDS),
        ] {
            let found: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(1) FROM {table} WHERE id IN {}",
                sql_list(ids)
            ))
            .fetch_one(pool)
            .await?;
            checks.push(VerificationCheck { name: label.to_owned(), passed: found == ids.len() as i64 });
        }

        for quotation in DEMO_QUOTATIONS {
            let header: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM quotation WHERE id = ?1 AND number = ?2 AND status = ?3
                                                        AND grand_total = ?4)",
            )
            .bind(quotation.id)
            .bind(quotation.number)
            .bind(quotation.status)
            .bind(quotation.grand_total)
            .fetch_one(pool)
            .await?;
            checks.push(VerificationCheck { name: quotation.number.to_owned(), passed: header == 1 });

            let services: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM quotation_service WHERE quotation_id = ?1")
                    .bind(quotation.id)
                    .fetch_one(pool)
                    .await?;
            let parts: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM quotation_part WHERE quotation_id = ?1")
                    .bind(quotation.id)
                    .fetch_one(pool)
                    .await?;
            checks.push(VerificationCheck {
                name: format!("{}-lines", quotation.number),
                passed: services == quotation.service_lines && parts == quotation.part_lines,
            });
        }

        let all_present = checks.iter().all(|check| check.passed);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo rows. Fails with `Protected` if work orders were created
    /// from them in the meantime.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = begin_write(pool).await?;
        let quotation_ids: Vec<i64> = DEMO_QUOTATIONS.iter().map(|quotation| quotation.id).collect();

        for (table, ids) in [
            ("quotation", quotation_ids.as_slice()),
            ("vehicle", DEMO_VEHICLE_IDS),
            ("customer", DEMO_CUSTOMER_IDS),
            ("service", DEMO_SERVICE_IDS),
            ("part", DEMO_PART_IDS),
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE id IN {}", sql_list(ids)))
                .execute(&mut *tx)
                .await
                .map_err(RepositoryError::classify_delete)?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct DemoQuotation {
    id: i64,
    number: &'static str,
    status: &'static str,
    service_lines: i64,
    part_lines: i64,
    grand_total: &'static str,
    description: &'static str,
}

fn sql_list(ids: &[i64]) -> String {
    let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    format!("({joined})")
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub quotations: Vec<SeededQuotation>,
}

#[derive(Debug, Serialize)]
pub struct SeededQuotation {
    pub number: &'static str,
    pub status: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<VerificationCheck>,
}

#[derive(Debug, Serialize)]
pub struct VerificationCheck {
    pub name: String,
    pub passed: bool,
}
