use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use workshop_core::access::Access;
use workshop_core::domain::customer::CustomerId;
use workshop_core::domain::line_item::LineItemInput;
use workshop_core::domain::vehicle::VehicleId;
use workshop_core::domain::workorder::{WorkOrderDraft, WorkOrderId, WorkOrderStatus};
use workshop_db::repositories::WorkOrderFilter;
use workshop_db::Page;

use super::views::WorkOrderView;
use super::{search_term, ApiJson, ApiQuery};
use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/workorders", get(list).post(create))
        .route("/api/workorders/{id}", get(retrieve).put(update).delete(destroy))
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkOrderQuery {
    status: Option<WorkOrderStatus>,
    customer: Option<i64>,
    vehicle: Option<i64>,
    search: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WorkOrderBody {
    #[serde(flatten)]
    header: WorkOrderDraft,
    #[serde(default)]
    services: Option<Vec<LineItemInput>>,
    #[serde(default)]
    parts: Option<Vec<LineItemInput>>,
}

async fn list(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ApiQuery(query): ApiQuery<WorkOrderQuery>,
) -> Result<Json<Page<WorkOrderView>>, ApiError> {
    state.authorize(&actor, Access::Read).await?;
    let filter = WorkOrderFilter {
        status: query.status,
        customer: query.customer.map(CustomerId),
        vehicle: query.vehicle.map(VehicleId),
        search: search_term(query.search),
    };
    let page = state.pagination.request(query.page, query.page_size);
    let found = state.workorders.list(&filter, page).await?;

    Ok(Json(Page {
        count: found.count,
        page: found.page,
        page_size: found.page_size,
        results: found.results.iter().map(WorkOrderView::from).collect(),
    }))
}

async fn retrieve(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<WorkOrderView>, ApiError> {
    state.authorize(&actor, Access::Read).await?;
    Ok(Json(WorkOrderView::from(&state.workorders.get(WorkOrderId(id)).await?)))
}

async fn create(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ApiJson(body): ApiJson<WorkOrderBody>,
) -> Result<(StatusCode, Json<WorkOrderView>), ApiError> {
    state.authorize(&actor, Access::Write).await?;
    let order = state
        .workorders
        .create(body.header, body.services.unwrap_or_default(), body.parts.unwrap_or_default())
        .await?;
    Ok((StatusCode::CREATED, Json(WorkOrderView::from(&order))))
}

async fn update(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<WorkOrderBody>,
) -> Result<Json<WorkOrderView>, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    let order =
        state.workorders.update(WorkOrderId(id), body.header, body.services, body.parts).await?;
    Ok(Json(WorkOrderView::from(&order)))
}

async fn destroy(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    state.workorders.delete(WorkOrderId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
