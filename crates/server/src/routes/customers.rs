use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use workshop_core::access::Access;
use workshop_core::domain::customer::{Customer, CustomerDraft, CustomerId};
use workshop_db::repositories::CustomerFilter;
use workshop_db::Page;

use super::{search_term, ApiJson, ApiQuery};
use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/customers", get(list).post(create))
        .route("/api/customers/{id}", get(retrieve).put(update).delete(destroy))
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerQuery {
    search: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

async fn list(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ApiQuery(query): ApiQuery<CustomerQuery>,
) -> Result<Json<Page<Customer>>, ApiError> {
    state.authorize(&actor, Access::Read).await?;
    let filter = CustomerFilter { search: search_term(query.search) };
    let page = state.pagination.request(query.page, query.page_size);
    Ok(Json(state.customers.list(&filter, page).await?))
}

async fn retrieve(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<Customer>, ApiError> {
    state.authorize(&actor, Access::Read).await?;
    Ok(Json(state.customers.get(CustomerId(id)).await?))
}

async fn create(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ApiJson(draft): ApiJson<CustomerDraft>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    state.authorize(&actor, Access::Write).await?;
    Ok((StatusCode::CREATED, Json(state.customers.create(draft).await?)))
}

async fn update(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
    ApiJson(draft): ApiJson<CustomerDraft>,
) -> Result<Json<Customer>, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    Ok(Json(state.customers.update(CustomerId(id), draft).await?))
}

async fn destroy(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    state.customers.delete(CustomerId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
