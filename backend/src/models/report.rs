use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{IncidentStatus, Severity};

/// Canonical incident report served to humans and downstream tooling.
/// Field set and ordering are stable; consumers key on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IncidentReport {
    pub incident_id: i64,
    pub title: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub generated_at: DateTime<Utc>,
    pub summary: String,
    pub anomaly_details: AnomalyDetailsSection,
    pub root_cause: RootCauseSection,
    pub blast_radius: BlastRadiusSection,
    pub recommended_actions: Vec<ReportAction>,
    pub timeline: Vec<TimelineEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnomalyDetailsSection {
    #[serde(rename = "type")]
    pub kind: String,
    pub table: String,
    pub detected_at: DateTime<Utc>,
    /// Always a list: scalar or object details are wrapped.
    #[schema(value_type = Vec<Object>)]
    pub changes: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RootCauseSection {
    pub explanation: String,
    pub source_table: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BlastRadiusSection {
    pub total_affected: i64,
    pub affected_tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReportAction {
    pub action: String,
    pub description: String,
    pub priority: i64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub event: String,
}
