use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::ColumnInfo;

/// Ordered worst-last: `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema, Hash,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AnomalyKind {
    SchemaDrift,
    FreshnessViolation,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::SchemaDrift => "schema_drift",
            AnomalyKind::FreshnessViolation => "freshness_violation",
        }
    }
}

/// Immutable detection record; `detail` holds a serialized [`AnomalyDetail`].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Anomaly {
    pub id: i64,
    pub table_id: i64,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub detail: String,
    pub detected_at: DateTime<Utc>,
}

impl Anomaly {
    pub fn parsed_detail(&self) -> Option<AnomalyDetail> {
        serde_json::from_str(&self.detail).ok()
    }
}

/// One schema difference between consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum SchemaChange {
    ColumnDeleted { column: String, old: ColumnInfo },
    ColumnAdded { column: String, nullable: bool, new: ColumnInfo },
    TypeChanged { column: String, old_type: String, new_type: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessDetail {
    pub last_update: DateTime<Utc>,
    pub sla_minutes: i64,
    pub minutes_overdue: f64,
}

/// Anomaly payload: schema drift carries a change list, freshness a single
/// object. The serialized shapes are distinct, so the enum stays untagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnomalyDetail {
    SchemaDrift(Vec<SchemaChange>),
    Freshness(FreshnessDetail),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnomalyResponse {
    pub id: i64,
    pub table_id: i64,
    pub kind: AnomalyKind,
    pub severity: Severity,
    #[schema(value_type = Object)]
    pub detail: serde_json::Value,
    pub detected_at: DateTime<Utc>,
}

impl From<Anomaly> for AnomalyResponse {
    fn from(anomaly: Anomaly) -> Self {
        let detail =
            serde_json::from_str(&anomaly.detail).unwrap_or(serde_json::Value::Null);
        Self {
            id: anomaly.id,
            table_id: anomaly.table_id,
            kind: anomaly.kind,
            severity: anomaly.severity,
            detail,
            detected_at: anomaly.detected_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_matches_rank() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::Critical.rank(), 4);
    }

    #[test]
    fn schema_change_serializes_with_change_tag() {
        let change = SchemaChange::TypeChanged {
            column: "price".to_string(),
            old_type: "FLOAT".to_string(),
            new_type: "VARCHAR".to_string(),
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["change"], "type_changed");
        assert_eq!(value["column"], "price");
    }

    #[test]
    fn detail_round_trips_both_shapes() {
        let drift = AnomalyDetail::SchemaDrift(vec![SchemaChange::ColumnDeleted {
            column: "price".to_string(),
            old: ColumnInfo {
                name: "price".to_string(),
                data_type: "FLOAT".to_string(),
                nullable: true,
                ordinal: 2,
            },
        }]);
        let json = serde_json::to_string(&drift).unwrap();
        assert!(json.starts_with('['));
        assert_eq!(serde_json::from_str::<AnomalyDetail>(&json).unwrap(), drift);

        let freshness = AnomalyDetail::Freshness(FreshnessDetail {
            last_update: Utc::now(),
            sla_minutes: 60,
            minutes_overdue: 30.0,
        });
        let json = serde_json::to_string(&freshness).unwrap();
        assert!(json.starts_with('{'));
        assert!(matches!(
            serde_json::from_str::<AnomalyDetail>(&json).unwrap(),
            AnomalyDetail::Freshness(_)
        ));
    }
}
