use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use workshop_core::access::Access;
use workshop_core::domain::customer::CustomerId;
use workshop_core::domain::vehicle::{Vehicle, VehicleDraft, VehicleId};
use workshop_db::repositories::VehicleFilter;
use workshop_db::Page;

use super::{search_term, ApiJson, ApiQuery};
use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/vehicles", get(list).post(create))
        .route("/api/vehicles/{id}", get(retrieve).put(update).delete(destroy))
}

#[derive(Debug, Default, Deserialize)]
pub struct VehicleQuery {
    owner: Option<i64>,
    search: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

async fn list(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ApiQuery(query): ApiQuery<VehicleQuery>,
) -> Result<Json<Page<Vehicle>>, ApiError> {
    state.authorize(&actor, Access::Read).await?;
    let filter = VehicleFilter { owner: query.owner.map(CustomerId), search: search_term(query.search) };
    let page = state.pagination.request(query.page, query.page_size);
    Ok(Json(state.vehicles.list(&filter, page).await?))
}

async fn retrieve(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<Vehicle>, ApiError> {
    state.authorize(&actor, Access::Read).await?;
    Ok(Json(state.vehicles.get(VehicleId(id)).await?))
}

async fn create(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ApiJson(draft): ApiJson<VehicleDraft>,
) -> Result<(StatusCode, Json<Vehicle>), ApiError> {
    state.authorize(&actor, Access::Write).await?;
    Ok((StatusCode::CREATED, Json(state.vehicles.create(draft).await?)))
}

async fn update(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
    ApiJson(draft): ApiJson<VehicleDraft>,
) -> Result<Json<Vehicle>, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    Ok(Json(state.vehicles.update(VehicleId(id), draft).await?))
}

async fn destroy(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    state.vehicles.delete(VehicleId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
