use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::AppState;
use crate::models::{
    CreateTableRequest, SnapshotResponse, TableResponse, UpdateTableRequest,
};
use crate::services::table_service::DEFAULT_PAGE_SIZE;
use crate::utils::ApiResult;

#[derive(Debug, Deserialize)]
pub struct ListTablesQuery {
    pub connection_id: Option<i64>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotsQuery {
    pub limit: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/api/v1/tables",
    request_body = CreateTableRequest,
    responses(
        (status = 201, description = "Table enrolled for monitoring", body = TableResponse),
        (status = 404, description = "Connection not found"),
        (status = 409, description = "Table already monitored")
    ),
    tag = "Tables"
)]
pub async fn create_table(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTableRequest>,
) -> ApiResult<(StatusCode, Json<TableResponse>)> {
    req.validate()?;
    let table = state.table_service.create_table(req).await?;
    Ok((StatusCode::CREATED, Json(table.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/tables",
    params(
        ("connection_id" = Option<i64>, Query, description = "Filter by connection"),
        ("page" = Option<i64>, Query, description = "Page number (1-based)"),
        ("per_page" = Option<i64>, Query, description = "Page size (max 200)")
    ),
    responses(
        (status = 200, description = "Monitored tables, newest first", body = Vec<TableResponse>)
    ),
    tag = "Tables"
)]
pub async fn list_tables(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTablesQuery>,
) -> ApiResult<Json<Vec<TableResponse>>> {
    let tables = state
        .table_service
        .list_tables(
            query.connection_id,
            query.page.unwrap_or(1),
            query.per_page.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(tables.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/tables/{id}",
    params(("id" = i64, Path, description = "Table ID")),
    responses(
        (status = 200, description = "Table details", body = TableResponse),
        (status = 404, description = "Table not found")
    ),
    tag = "Tables"
)]
pub async fn get_table(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<TableResponse>> {
    let table = state.table_service.get_table(id).await?;
    Ok(Json(table.into()))
}

#[utoipa::path(
    put,
    path = "/api/v1/tables/{id}",
    params(("id" = i64, Path, description = "Table ID")),
    request_body = UpdateTableRequest,
    responses(
        (status = 200, description = "Table updated", body = TableResponse),
        (status = 404, description = "Table not found")
    ),
    tag = "Tables"
)]
pub async fn update_table(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTableRequest>,
) -> ApiResult<Json<TableResponse>> {
    let table = state.table_service.update_table(id, req).await?;
    Ok(Json(table.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/tables/{id}",
    params(("id" = i64, Path, description = "Table ID")),
    responses(
        (status = 204, description = "Table deleted"),
        (status = 404, description = "Table not found")
    ),
    tag = "Tables"
)]
pub async fn delete_table(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.table_service.delete_table(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/tables/{id}/snapshots",
    params(
        ("id" = i64, Path, description = "Table ID"),
        ("limit" = Option<i64>, Query, description = "Max snapshots (default 20, max 100)")
    ),
    responses(
        (status = 200, description = "Schema snapshots, newest first", body = Vec<SnapshotResponse>),
        (status = 404, description = "Table not found")
    ),
    tag = "Tables"
)]
pub async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<SnapshotsQuery>,
) -> ApiResult<Json<Vec<SnapshotResponse>>> {
    let snapshots = state
        .table_service
        .list_snapshots(id, query.limit.unwrap_or(20))
        .await?;
    Ok(Json(snapshots.into_iter().map(Into::into).collect()))
}
