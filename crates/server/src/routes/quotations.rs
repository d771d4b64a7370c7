use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use workshop_core::access::{Access, QuotationAction};
use workshop_core::domain::customer::CustomerId;
use workshop_core::domain::line_item::{LineItemId, LineItemInput, LineKind};
use workshop_core::domain::quotation::{QuotationDraft, QuotationId, QuotationPatch, QuotationStatus};
use workshop_core::domain::vehicle::VehicleId;
use workshop_db::repositories::{ConversionResult, QuotationFilter};
use workshop_db::Page;

use super::views::{LineView, QuotationView, StatusView};
use super::{double_option, search_term, ApiJson, ApiQuery};
use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/quotations", get(list).post(create))
        .route(
            "/api/quotations/{id}",
            get(retrieve).put(replace).patch(partial_update).delete(destroy),
        )
        .route("/api/quotations/{id}/approve", post(approve))
        .route("/api/quotations/{id}/reject", post(reject))
        .route("/api/quotations/{id}/send", post(send))
        .route("/api/quotations/{id}/set-status", post(set_status))
        .route("/api/quotations/{id}/to-workorder", post(to_workorder))
        .route("/api/quotations/{id}/services", post(add_service))
        .route(
            "/api/quotations/{id}/services/{line_id}",
            put(update_service).delete(delete_service),
        )
        .route("/api/quotations/{id}/parts", post(add_part))
        .route("/api/quotations/{id}/parts/{line_id}", put(update_part).delete(delete_part))
}

#[derive(Debug, Default, Deserialize)]
pub struct QuotationQuery {
    status: Option<QuotationStatus>,
    customer: Option<i64>,
    vehicle: Option<i64>,
    search: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

/// `POST` and `PUT` body: the header plus optional nested line collections.
#[derive(Debug, Deserialize)]
pub struct QuotationBody {
    #[serde(flatten)]
    header: QuotationDraft,
    #[serde(default)]
    services: Option<Vec<LineItemInput>>,
    #[serde(default)]
    parts: Option<Vec<LineItemInput>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuotationPatchBody {
    #[serde(default)]
    number: Option<String>,
    #[serde(default)]
    status: Option<QuotationStatus>,
    #[serde(default)]
    customer: Option<CustomerId>,
    #[serde(default, deserialize_with = "double_option")]
    vehicle: Option<Option<VehicleId>>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    valid_until: Option<Option<NaiveDate>>,
    #[serde(default)]
    discount_total: Option<Decimal>,
    #[serde(default)]
    tax_total: Option<Decimal>,
    #[serde(default)]
    services: Option<Vec<LineItemInput>>,
    #[serde(default)]
    parts: Option<Vec<LineItemInput>>,
}

impl From<QuotationPatchBody> for QuotationPatch {
    fn from(body: QuotationPatchBody) -> Self {
        Self {
            number: body.number,
            status: body.status,
            customer: body.customer,
            vehicle: body.vehicle,
            notes: body.notes,
            valid_until: body.valid_until,
            discount_total: body.discount_total,
            tax_total: body.tax_total,
            services: body.services,
            parts: body.parts,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    #[serde(default)]
    status: Option<String>,
}

async fn list(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ApiQuery(query): ApiQuery<QuotationQuery>,
) -> Result<Json<Page<QuotationView>>, ApiError> {
    state.authorize(&actor, Access::Read).await?;
    let filter = QuotationFilter {
        status: query.status,
        customer: query.customer.map(CustomerId),
        vehicle: query.vehicle.map(VehicleId),
        search: search_term(query.search),
    };
    let page = state.pagination.request(query.page, query.page_size);
    let found = state.quotations.list(&filter, page).await?;

    Ok(Json(Page {
        count: found.count,
        page: found.page,
        page_size: found.page_size,
        results: found.results.iter().map(QuotationView::from).collect(),
    }))
}

async fn retrieve(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<QuotationView>, ApiError> {
    state.authorize(&actor, Access::Read).await?;
    let detail = state.quotations.get(QuotationId(id)).await?;
    Ok(Json(QuotationView::from(&detail)))
}

async fn create(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    ApiJson(body): ApiJson<QuotationBody>,
) -> Result<(StatusCode, Json<QuotationView>), ApiError> {
    state.authorize(&actor, Access::Write).await?;
    let detail = state
        .quotations
        .create(body.header, body.services.unwrap_or_default(), body.parts.unwrap_or_default())
        .await?;
    Ok((StatusCode::CREATED, Json(QuotationView::from(&detail))))
}

async fn replace(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<QuotationBody>,
) -> Result<Json<QuotationView>, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    let patch = body.header.into_patch(body.services, body.parts);
    let detail = state.quotations.update(QuotationId(id), patch).await?;
    Ok(Json(QuotationView::from(&detail)))
}

async fn partial_update(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<QuotationPatchBody>,
) -> Result<Json<QuotationView>, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    let detail = state.quotations.update(QuotationId(id), body.into()).await?;
    Ok(Json(QuotationView::from(&detail)))
}

async fn destroy(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    state.quotations.delete(QuotationId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn approve(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<StatusView>, ApiError> {
    state.authorize(&actor, Access::Action(QuotationAction::Approve)).await?;
    Ok(Json(state.quotations.approve(QuotationId(id)).await?.into()))
}

async fn reject(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<StatusView>, ApiError> {
    state.authorize(&actor, Access::Action(QuotationAction::Reject)).await?;
    Ok(Json(state.quotations.reject(QuotationId(id)).await?.into()))
}

async fn send(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<StatusView>, ApiError> {
    state.authorize(&actor, Access::Action(QuotationAction::Send)).await?;
    Ok(Json(state.quotations.send(QuotationId(id)).await?.into()))
}

async fn set_status(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<StatusBody>,
) -> Result<Json<StatusView>, ApiError> {
    state.authorize(&actor, Access::Action(QuotationAction::SetStatus)).await?;
    let raw = body.status.ok_or_else(|| ApiError::bad_request("`status` is required"))?;
    Ok(Json(state.quotations.set_status(QuotationId(id), &raw).await?.into()))
}

async fn to_workorder(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<ConversionResult>), ApiError> {
    state.authorize(&actor, Access::Action(QuotationAction::ToWorkorder)).await?;
    let converted = state.quotations.convert_to_workorder(QuotationId(id)).await?;
    Ok((StatusCode::CREATED, Json(converted)))
}

async fn add_line(
    state: &AppState,
    id: i64,
    kind: LineKind,
    input: LineItemInput,
) -> Result<(StatusCode, Json<LineView>), ApiError> {
    let line = state.quotations.add_line(QuotationId(id), kind, input).await?;
    Ok((StatusCode::CREATED, Json(LineView::from(&line))))
}

async fn update_line(
    state: &AppState,
    (id, line_id): (i64, i64),
    kind: LineKind,
    input: LineItemInput,
) -> Result<Json<LineView>, ApiError> {
    let line =
        state.quotations.update_line(QuotationId(id), kind, LineItemId(line_id), input).await?;
    Ok(Json(LineView::from(&line)))
}

async fn delete_line(
    state: &AppState,
    (id, line_id): (i64, i64),
    kind: LineKind,
) -> Result<StatusCode, ApiError> {
    state.quotations.delete_line(QuotationId(id), kind, LineItemId(line_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_service(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<LineItemInput>,
) -> Result<(StatusCode, Json<LineView>), ApiError> {
    state.authorize(&actor, Access::Write).await?;
    add_line(&state, id, LineKind::Service, input).await
}

async fn update_service(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(ids): Path<(i64, i64)>,
    ApiJson(input): ApiJson<LineItemInput>,
) -> Result<Json<LineView>, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    update_line(&state, ids, LineKind::Service, input).await
}

async fn delete_service(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(ids): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    delete_line(&state, ids, LineKind::Service).await
}

async fn add_part(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<LineItemInput>,
) -> Result<(StatusCode, Json<LineView>), ApiError> {
    state.authorize(&actor, Access::Write).await?;
    add_line(&state, id, LineKind::Part, input).await
}

async fn update_part(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(ids): Path<(i64, i64)>,
    ApiJson(input): ApiJson<LineItemInput>,
) -> Result<Json<LineView>, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    update_line(&state, ids, LineKind::Part, input).await
}

async fn delete_part(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(ids): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.authorize(&actor, Access::Write).await?;
    delete_line(&state, ids, LineKind::Part).await
}
