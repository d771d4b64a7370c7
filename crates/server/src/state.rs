use std::sync::Arc;

use workshop_core::access::{authorize, Access, Actor, AuthorizationPort};
use workshop_core::auth::TokenCodec;
use workshop_core::config::AppConfig;
use workshop_db::repositories::{
    SqlAuthorizationStore, SqlCatalogRepository, SqlCustomerRepository, SqlQuotationRepository,
    SqlVehicleRepository, SqlWorkOrderRepository,
};
use workshop_db::{DbPool, PageRequest};

use crate::error::ApiError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Pagination {
    /// Missing values fall back to page 1 and the default size; oversized
    /// pages are clamped.
    pub fn request(&self, page: Option<u32>, page_size: Option<u32>) -> PageRequest {
        let size = page_size.unwrap_or(self.default_page_size).min(self.max_page_size);
        PageRequest::new(page.unwrap_or(1), size)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub customers: SqlCustomerRepository,
    pub vehicles: SqlVehicleRepository,
    pub catalog: SqlCatalogRepository,
    pub quotations: SqlQuotationRepository,
    pub workorders: SqlWorkOrderRepository,
    pub authorization: Arc<dyn AuthorizationPort>,
    pub tokens: Arc<TokenCodec>,
    pub pagination: Pagination,
}

impl AppState {
    /// Repositories over `db_pool`, with grants read from `role_capability`.
    pub fn new(db_pool: DbPool, config: &AppConfig) -> Self {
        Self {
            customers: SqlCustomerRepository::new(db_pool.clone()),
            vehicles: SqlVehicleRepository::new(db_pool.clone()),
            catalog: SqlCatalogRepository::new(db_pool.clone()),
            quotations: SqlQuotationRepository::new(db_pool.clone(), config.workflow.clone()),
            workorders: SqlWorkOrderRepository::new(
                db_pool.clone(),
                config.workflow.number_retry_attempts,
            ),
            authorization: Arc::new(SqlAuthorizationStore::new(db_pool.clone())),
            tokens: Arc::new(TokenCodec::from_config(&config.auth)),
            pagination: Pagination {
                default_page_size: config.server.default_page_size,
                max_page_size: config.server.max_page_size,
            },
            db_pool,
        }
    }

    pub fn with_authorization(mut self, port: Arc<dyn AuthorizationPort>) -> Self {
        self.authorization = port;
        self
    }

    pub async fn authorize(&self, actor: &Actor, access: Access) -> Result<(), ApiError> {
        authorize(self.authorization.as_ref(), actor, access).await.map_err(ApiError::from)
    }
}
