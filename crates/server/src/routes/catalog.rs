use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use workshop_core::access::Access;
use workshop_core::domain::catalog::{Part, PartDraft, PartId, Service, ServiceDraft, ServiceId};
use workshop_db::repositories::CatalogFilter;
use workshop_db::Page;

use super::{search_term, ApiJson, ApiQuery};
use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/services", get(list_services).post(create_service))
        .route(
            "/api/services/{id}",
            get(retrieve_service).put(update_service).delete(destroy_service),
        )
        .route("/api/parts", get(list_parts).post(create_part))
        .route("/api/parts/{id}", get(retrieve_part).put(update_part).delete(destroy_part))
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    search: Option<String>,
    is_active: Option<bool>,
    page: Option<u32>,
    page_size: Option<u32>,
}

impl CatalogQuery {
    fn filter(&self) -> CatalogFilter {
        CatalogFilter { search: search_term(self.search.clone()), is_active: self.is_active }
    }
}

async fn list_services(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ApiQuery(query): ApiQuery<CatalogQuery>,
) -> Result<Json<Page<Service>>, ApiError> {
    state.authorize(&actor, Access::Read).await?;
    let page = state.pagination.request(query.page, query.page_size);
    Ok(Json(state.catalog.list_services(&query.filter(), page).await?))
}

async fn retrieve_service(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<Service>, ApiError> {
    state.authorize(&actor, Access::Read).await?;
    Ok(Json(state.catalog.get_service(ServiceId(id)).await?))
}

async fn create_service(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ApiJson(draft): ApiJson<ServiceDraft>,
) -> Result<(StatusCode, Json<Service>), ApiError> {
    state.authorize(&actor, Access::Write).await?;
    Ok((StatusCode::CREATED, Json(state.catalog.create_service(draft).await?)))
}

async fn update_service(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
    ApiJson(draft): ApiJson<ServiceDraft>,
) -> Result<Json<Service>, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    Ok(Json(state.catalog.update_service(ServiceId(id), draft).await?))
}

async fn destroy_service(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    state.catalog.delete_service(ServiceId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_parts(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ApiQuery(query): ApiQuery<CatalogQuery>,
) -> Result<Json<Page<Part>>, ApiError> {
    state.authorize(&actor, Access::Read).await?;
    let page = state.pagination.request(query.page, query.page_size);
    Ok(Json(state.catalog.list_parts(&query.filter(), page).await?))
}

async fn retrieve_part(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<Part>, ApiError> {
    state.authorize(&actor, Access::Read).await?;
    Ok(Json(state.catalog.get_part(PartId(id)).await?))
}

async fn create_part(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ApiJson(draft): ApiJson<PartDraft>,
) -> Result<(StatusCode, Json<Part>), ApiError> {
    state.authorize(&actor, Access::Write).await?;
    Ok((StatusCode::CREATED, Json(state.catalog.create_part(draft).await?)))
}

async fn update_part(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
    ApiJson(draft): ApiJson<PartDraft>,
) -> Result<Json<Part>, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    Ok(Json(state.catalog.update_part(PartId(id), draft).await?))
}

async fn destroy_part(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    state.catalog.delete_part(PartId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
