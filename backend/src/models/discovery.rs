use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{CheckType, ColumnInfo};

/// Role a warehouse table is classified into during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TableRole {
    Fact,
    Dimension,
    Staging,
    Raw,
    Snapshot,
    System,
    Unknown,
}

/// Suggested monitoring configuration for one discovered table. Nothing is
/// enrolled until an operator confirms the proposal via the tables API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TableProposal {
    pub schema_name: String,
    pub table_name: String,
    pub fqn: String,
    pub role: TableRole,
    pub columns: Vec<ColumnInfo>,
    pub recommended_checks: Vec<CheckType>,
    pub suggested_sla_minutes: Option<i64>,
    pub reasoning: String,
    pub skip: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscoveryReport {
    pub connection_id: i64,
    pub connection_name: String,
    pub schemas_found: Vec<String>,
    pub total_tables: i64,
    pub proposals: Vec<TableProposal>,
    pub concerns: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeltaAction {
    New,
    Dropped,
}

/// Difference between the live catalog and the enrolled tables.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TableDelta {
    pub action: DeltaAction,
    pub schema_name: String,
    pub table_name: String,
    pub fqn: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RediscoveryResponse {
    pub connection_id: i64,
    pub total_deltas: i64,
    pub deltas: Vec<TableDelta>,
}
