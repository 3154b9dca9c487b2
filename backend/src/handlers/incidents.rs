use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::AppState;
use crate::models::{ApproveIncidentRequest, DismissIncidentRequest, IncidentResponse};
use crate::services::incident_service::IncidentFilter;
use crate::utils::ApiResult;

#[utoipa::path(
    get,
    path = "/api/v1/incidents",
    params(
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("severity" = Option<String>, Query, description = "Filter by severity"),
        ("table_id" = Option<i64>, Query, description = "Filter by table"),
        ("since" = Option<String>, Query, description = "Created at or after (RFC 3339)"),
        ("page" = Option<i64>, Query, description = "Page number (1-based)"),
        ("per_page" = Option<i64>, Query, description = "Page size (default 50, max 200)")
    ),
    responses(
        (status = 200, description = "Incidents, newest first", body = Vec<IncidentResponse>)
    ),
    tag = "Incidents"
)]
pub async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<IncidentFilter>,
) -> ApiResult<Json<Vec<IncidentResponse>>> {
    let incidents = state.incident_service.list_incidents(filter).await?;
    Ok(Json(incidents.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/incidents/{id}",
    params(("id" = i64, Path, description = "Incident ID")),
    responses(
        (status = 200, description = "Incident details", body = IncidentResponse),
        (status = 404, description = "Incident not found")
    ),
    tag = "Incidents"
)]
pub async fn get_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<IncidentResponse>> {
    let incident = state.incident_service.get_incident(id).await?;
    Ok(Json(incident.into()))
}

#[utoipa::path(
    get,
    path = "/api/v1/incidents/{id}/report",
    params(("id" = i64, Path, description = "Incident ID")),
    responses(
        (status = 200, description = "Structured incident report"),
        (status = 204, description = "No report was generated"),
        (status = 404, description = "Incident not found")
    ),
    tag = "Incidents"
)]
pub async fn get_incident_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    match state.incident_service.get_report(id).await? {
        Some(report) => Ok(Json(report).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/incidents/{id}/approve",
    params(("id" = i64, Path, description = "Incident ID")),
    request_body = ApproveIncidentRequest,
    responses(
        (status = 200, description = "Incident resolved", body = IncidentResponse),
        (status = 404, description = "Incident not found"),
        (status = 409, description = "Incident already closed")
    ),
    tag = "Incidents"
)]
pub async fn approve_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ApproveIncidentRequest>,
) -> ApiResult<Json<IncidentResponse>> {
    let incident = state.incident_service.approve_incident(id, req.resolved_by).await?;
    tracing::info!("Incident {} resolved", incident.id);
    Ok(Json(incident.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/incidents/{id}/dismiss",
    params(("id" = i64, Path, description = "Incident ID")),
    request_body = DismissIncidentRequest,
    responses(
        (status = 200, description = "Incident dismissed", body = IncidentResponse),
        (status = 404, description = "Incident not found"),
        (status = 409, description = "Incident already closed")
    ),
    tag = "Incidents"
)]
pub async fn dismiss_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<DismissIncidentRequest>,
) -> ApiResult<Json<IncidentResponse>> {
    let incident = state.incident_service.dismiss_incident(id, req.reason).await?;
    tracing::info!("Incident {} dismissed", incident.id);
    Ok(Json(incident.into()))
}
