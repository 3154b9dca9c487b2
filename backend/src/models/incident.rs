use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::Severity;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Investigating,
    PendingReview,
    Resolved,
    Dismissed,
}

impl IncidentStatus {
    /// Statuses participating in dedupe and open-incident counting.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open | Self::Investigating | Self::PendingReview)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Investigating => "investigating",
            Self::PendingReview => "pending_review",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Incident {
    pub id: i64,
    pub anomaly_id: i64,
    pub status: IncidentStatus,
    pub severity: Severity,
    pub diagnosis: Option<String>,
    pub blast_radius: Option<String>,
    pub remediation: Option<String>,
    pub report: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub dismiss_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Diagnosis & remediation value objects
// ============================================================================

fn default_priority() -> i64 {
    1
}

fn default_confidence() -> f64 {
    0.5
}

fn default_severity() -> Severity {
    Severity::Medium
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Recommendation {
    pub action: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

/// Root-cause analysis result, LLM-produced or rule-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Diagnosis {
    pub root_cause: String,
    pub root_cause_table: String,
    #[serde(default)]
    pub blast_radius: Vec<String>,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    PendingApproval,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RemediationAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub description: String,
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    pub status: ActionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Remediation {
    pub actions: Vec<RemediationAction>,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// API request/response types
// ============================================================================

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ApproveIncidentRequest {
    /// Recorded as `resolved_by`; defaults to "api_user".
    #[serde(default)]
    pub resolved_by: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DismissIncidentRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IncidentResponse {
    pub id: i64,
    pub anomaly_id: i64,
    pub status: IncidentStatus,
    pub severity: Severity,
    #[schema(value_type = Option<Object>)]
    pub diagnosis: Option<serde_json::Value>,
    pub blast_radius: Option<Vec<String>>,
    #[schema(value_type = Option<Object>)]
    pub remediation: Option<serde_json::Value>,
    pub has_report: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub dismiss_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Incident> for IncidentResponse {
    fn from(incident: Incident) -> Self {
        let diagnosis = incident
            .diagnosis
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        let blast_radius = incident
            .blast_radius
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        let remediation = incident
            .remediation
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        Self {
            id: incident.id,
            anomaly_id: incident.anomaly_id,
            status: incident.status,
            severity: incident.severity,
            diagnosis,
            blast_radius,
            remediation,
            has_report: incident.report.is_some(),
            resolved_at: incident.resolved_at,
            resolved_by: incident.resolved_by,
            dismiss_reason: incident.dismiss_reason,
            created_at: incident.created_at,
            updated_at: incident.updated_at,
        }
    }
}
