use axum::{Json, extract::State};
use std::sync::Arc;

use crate::AppState;
use crate::models::{HealthResponse, ScanTriggerResponse, StatsResponse, StatusResponse};
use crate::utils::ApiResult;

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Liveness probe", body = HealthResponse)),
    tag = "System"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "vigil",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses((status = 200, description = "Scanner and stream status", body = StatusResponse)),
    tag = "System"
)]
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        scanner: if state.scanner_running { "running" } else { "disabled" },
        websocket_clients: state.notifier.client_count(),
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/stats",
    responses((status = 200, description = "Platform-wide statistics", body = StatsResponse)),
    tag = "System"
)]
pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatsResponse>> {
    let stats = state.stats_service.stats().await?;
    Ok(Json(stats))
}

#[utoipa::path(
    post,
    path = "/api/v1/scan/trigger",
    responses((status = 200, description = "Scan cycle completed", body = ScanTriggerResponse)),
    tag = "System"
)]
pub async fn trigger_scan(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ScanTriggerResponse>> {
    tracing::info!("Manual scan triggered");
    let (tables_scanned, anomalies_found) = state.scanner.run_scan_cycle().await?;
    Ok(Json(ScanTriggerResponse {
        status: "scan_completed",
        tables_scanned,
        anomalies_found,
    }))
}
