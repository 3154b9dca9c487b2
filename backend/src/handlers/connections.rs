use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::AppState;
use crate::models::{
    ConnectionResponse, ConnectionTestResponse, CreateConnectionRequest, DiscoveryReport,
    RediscoveryResponse, UpdateConnectionRequest,
};
use crate::services::connector::create_connector;
use crate::utils::ApiResult;

#[utoipa::path(
    post,
    path = "/api/v1/connections",
    request_body = CreateConnectionRequest,
    responses(
        (status = 201, description = "Connection created", body = ConnectionResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Connection name already exists")
    ),
    tag = "Connections"
)]
pub async fn create_connection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConnectionRequest>,
) -> ApiResult<(StatusCode, Json<ConnectionResponse>)> {
    req.validate()?;
    tracing::info!("Connection creation request: name={}, dialect={}", req.name, req.dialect);
    let connection = state.connection_service.create_connection(req).await?;
    Ok((StatusCode::CREATED, Json(connection.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/connections",
    responses(
        (status = 200, description = "Connections, newest first", body = Vec<ConnectionResponse>)
    ),
    tag = "Connections"
)]
pub async fn list_connections(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ConnectionResponse>>> {
    let connections = state.connection_service.list_connections().await?;
    Ok(Json(connections.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/connections/{id}",
    params(("id" = i64, Path, description = "Connection ID")),
    responses(
        (status = 200, description = "Connection details", body = ConnectionResponse),
        (status = 404, description = "Connection not found")
    ),
    tag = "Connections"
)]
pub async fn get_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ConnectionResponse>> {
    let connection = state.connection_service.get_connection(id).await?;
    Ok(Json(connection.into()))
}

#[utoipa::path(
    put,
    path = "/api/v1/connections/{id}",
    params(("id" = i64, Path, description = "Connection ID")),
    request_body = UpdateConnectionRequest,
    responses(
        (status = 200, description = "Connection updated", body = ConnectionResponse),
        (status = 404, description = "Connection not found")
    ),
    tag = "Connections"
)]
pub async fn update_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateConnectionRequest>,
) -> ApiResult<Json<ConnectionResponse>> {
    req.validate()?;
    let connection = state.connection_service.update_connection(id, req).await?;
    Ok(Json(connection.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/connections/{id}",
    params(("id" = i64, Path, description = "Connection ID")),
    responses(
        (status = 204, description = "Connection deleted"),
        (status = 404, description = "Connection not found")
    ),
    tag = "Connections"
)]
pub async fn delete_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.connection_service.delete_connection(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/connections/{id}/test",
    params(("id" = i64, Path, description = "Connection ID")),
    responses(
        (status = 200, description = "Probe result", body = ConnectionTestResponse),
        (status = 404, description = "Connection not found")
    ),
    tag = "Connections"
)]
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ConnectionTestResponse>> {
    let result = state.connection_service.test_connection(id).await?;
    tracing::info!("Connectivity probe for '{}': success={}", result.connection, result.success);
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/v1/connections/{id}/discover",
    params(("id" = i64, Path, description = "Connection ID")),
    responses(
        (status = 200, description = "Classified table proposals", body = DiscoveryReport),
        (status = 404, description = "Connection not found")
    ),
    tag = "Discovery"
)]
pub async fn discover(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<DiscoveryReport>> {
    let connection = state.connection_service.get_connection(id).await?;
    let uri = state.connection_service.reveal_uri(&connection)?;
    let connector = create_connector(&connection, &uri, Arc::clone(&state.pool_manager))?;

    let report = state.discovery_service.discover(&connection, connector.as_ref()).await;
    connector.dispose().await;
    let report = report?;

    tracing::info!(
        "Discovery on '{}': {} tables across {} schemas",
        connection.name,
        report.total_tables,
        report.schemas_found.len()
    );
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/api/v1/connections/{id}/rediscover",
    params(("id" = i64, Path, description = "Connection ID")),
    responses(
        (status = 200, description = "Catalog deltas", body = RediscoveryResponse),
        (status = 404, description = "Connection not found")
    ),
    tag = "Discovery"
)]
pub async fn rediscover(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<RediscoveryResponse>> {
    let connection = state.connection_service.get_connection(id).await?;
    let uri = state.connection_service.reveal_uri(&connection)?;
    let connector = create_connector(&connection, &uri, Arc::clone(&state.pool_manager))?;

    let deltas = state.discovery_service.rediscover(connection.id, connector.as_ref()).await;
    connector.dispose().await;
    let deltas = deltas?;

    let total_deltas = deltas.len() as i64;
    state
        .notifier
        .broadcast("discovery.update", json!({ "total_deltas": total_deltas }));

    Ok(Json(RediscoveryResponse { connection_id: connection.id, total_deltas, deltas }))
}
