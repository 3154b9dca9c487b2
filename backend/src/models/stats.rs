use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub scanner: &'static str,
    pub websocket_clients: usize,
}

/// Platform-wide health aggregation for the dashboard.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub health_score: f64,
    pub total_tables: i64,
    pub healthy_tables: i64,
    pub open_incidents: i64,
    pub critical_incidents: i64,
    pub anomalies_24h: i64,
    pub avg_resolution_time_minutes: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScanTriggerResponse {
    pub status: &'static str,
    pub tables_scanned: i64,
    pub anomalies_found: i64,
}
