//! Standalone line writes racing on one quotation through a multi-connection pool.

use rust_decimal::Decimal;
use tempfile::TempDir;

use workshop_core::config::WorkflowConfig;
use workshop_core::domain::catalog::ServiceDraft;
use workshop_core::domain::customer::CustomerDraft;
use workshop_core::domain::line_item::{LineItemInput, LineKind};
use workshop_core::domain::quotation::QuotationDraft;
use workshop_db::repositories::{SqlCatalogRepository, SqlCustomerRepository, SqlQuotationRepository};
use workshop_db::{connect_with_settings, migrations, DbPool};

async fn file_pool(dir: &TempDir) -> DbPool {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("workshop.db").display());
    let pool = connect_with_settings(&url, 8, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_line_additions_all_commit() {
    let dir = TempDir::new().expect("tempdir");
    let pool = file_pool(&dir).await;
    let customer = SqlCustomerRepository::new(pool.clone())
        .create(CustomerDraft { name: "Ana Pérez".to_owned(), ..CustomerDraft::default() })
        .await
        .expect("customer");
    let service = SqlCatalogRepository::new(pool.clone())
        .create_service(ServiceDraft {
            code: "SRV-OIL".to_owned(),
            name: "Cambio de aceite".to_owned(),
            description: String::new(),
            labor_minutes: 30,
            price: Decimal::TEN,
            is_active: true,
        })
        .await
        .expect("service");
    let repo = SqlQuotationRepository::new(
        pool.clone(),
        WorkflowConfig { enforce_transitions: false, number_retry_attempts: 3 },
    );
    let quotation = repo
        .create(
            QuotationDraft {
                number: None,
                status: None,
                customer: customer.id,
                vehicle: None,
                notes: String::new(),
                valid_until: None,
                discount_total: Decimal::ZERO,
                tax_total: Decimal::ZERO,
            },
            vec![],
            vec![],
        )
        .await
        .expect("quotation")
        .quotation;

    let mut tasks = Vec::new();
    for _ in 0..40 {
        let repo = repo.clone();
        let input = LineItemInput {
            id: None,
            catalog_id: service.id.0,
            quantity: Decimal::ONE,
            unit_price: Decimal::TEN,
            discount: Decimal::ZERO,
        };
        tasks.push(tokio::spawn(async move {
            repo.add_line(quotation.id, LineKind::Service, input).await
        }));
    }
    for task in tasks {
        task.await.expect("task").expect("line write should wait for the lock, not fail");
    }

    let detail = repo.get(quotation.id).await.expect("reload");
    assert_eq!(detail.services.len(), 40);
    assert_eq!(detail.quotation.totals.grand_total.to_string(), "400.00");
}
