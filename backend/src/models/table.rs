use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Checks a monitored table is enrolled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Schema,
    Freshness,
}

/// One column as reported by a warehouse's information schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub ordinal: i64,
}

/// One table as listed by a warehouse catalog.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TableInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub table_type: String,
    pub schema: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MonitoredTable {
    pub id: i64,
    pub connection_id: i64,
    pub schema_name: String,
    pub table_name: String,
    pub fqn: String,
    /// JSON array of [`CheckType`]s, stored verbatim.
    pub check_types: String,
    pub freshness_sla_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonitoredTable {
    /// Parse the stored `check_types` column. Unparseable rows check nothing.
    pub fn parsed_check_types(&self) -> Vec<CheckType> {
        serde_json::from_str(&self.check_types).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTableRequest {
    pub connection_id: i64,
    #[validate(length(min = 1, max = 256))]
    pub schema_name: String,
    #[validate(length(min = 1, max = 256))]
    pub table_name: String,
    #[serde(default = "default_check_types")]
    pub check_types: Vec<CheckType>,
    pub freshness_sla_minutes: Option<i64>,
}

fn default_check_types() -> Vec<CheckType> {
    vec![CheckType::Schema, CheckType::Freshness]
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTableRequest {
    pub check_types: Option<Vec<CheckType>>,
    pub freshness_sla_minutes: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TableResponse {
    pub id: i64,
    pub connection_id: i64,
    pub schema_name: String,
    pub table_name: String,
    pub fqn: String,
    pub check_types: Vec<CheckType>,
    pub freshness_sla_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<MonitoredTable> for TableResponse {
    fn from(table: MonitoredTable) -> Self {
        let check_types = table.parsed_check_types();
        Self {
            id: table.id,
            connection_id: table.connection_id,
            schema_name: table.schema_name,
            table_name: table.table_name,
            fqn: table.fqn,
            check_types,
            freshness_sla_minutes: table.freshness_sla_minutes,
            created_at: table.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SchemaSnapshot {
    pub id: i64,
    pub table_id: i64,
    /// Canonical JSON of the column list at capture time.
    pub columns: String,
    pub snapshot_hash: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotResponse {
    pub id: i64,
    #[schema(value_type = Object)]
    pub columns: serde_json::Value,
    pub snapshot_hash: String,
    pub captured_at: DateTime<Utc>,
}

impl From<SchemaSnapshot> for SnapshotResponse {
    fn from(snapshot: SchemaSnapshot) -> Self {
        let columns = serde_json::from_str(&snapshot.columns)
            .unwrap_or(serde_json::Value::Array(Vec::new()));
        Self {
            id: snapshot.id,
            columns,
            snapshot_hash: snapshot.snapshot_hash,
            captured_at: snapshot.captured_at,
        }
    }
}
