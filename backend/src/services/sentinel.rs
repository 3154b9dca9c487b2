//! Sentinels — deterministic anomaly detection, no LLM involved.
//!
//! Both sentinels are side-effect-free on warehouse failure: a connector
//! error means "no result", never a spurious anomaly.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::models::{
    Anomaly, AnomalyDetail, AnomalyKind, ColumnInfo, FreshnessDetail, MonitoredTable,
    SchemaChange, SchemaSnapshot, Severity,
};
use crate::services::connector::WarehouseConnector;
use crate::utils::ApiResult;

/// Detects schema drift by comparing information-schema snapshots.
pub struct SchemaSentinel;

impl SchemaSentinel {
    pub async fn inspect(
        &self,
        table: &MonitoredTable,
        connector: &dyn WarehouseConnector,
        pool: &SqlitePool,
    ) -> ApiResult<Option<Anomaly>> {
        // 1. Fetch current schema from the warehouse
        let current_columns =
            match connector.fetch_schema(&table.schema_name, &table.table_name).await {
                Ok(columns) => columns,
                Err(e) => {
                    tracing::error!("Failed to fetch schema for {}: {}", table.fqn, e);
                    return Ok(None);
                },
            };

        // 2. Hash for O(1) drift detection
        let columns_json = canonicalize_columns(&current_columns);
        let current_hash = sha256_hex(&columns_json);

        // 3. Latest snapshot is the baseline
        let last_snapshot: Option<SchemaSnapshot> = sqlx::query_as(
            "SELECT * FROM schema_snapshots WHERE table_id = ? \
             ORDER BY captured_at DESC, id DESC LIMIT 1",
        )
        .bind(table.id)
        .fetch_optional(pool)
        .await?;

        // 4. Unchanged hash: nothing to record, idempotent across cycles
        if let Some(snapshot) = &last_snapshot {
            if snapshot.snapshot_hash == current_hash {
                return Ok(None);
            }
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO schema_snapshots (table_id, columns, snapshot_hash, captured_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(table.id)
        .bind(&columns_json)
        .bind(&current_hash)
        .bind(now)
        .execute(pool)
        .await?;

        let Some(last_snapshot) = last_snapshot else {
            tracing::info!("First snapshot for {} - no baseline to compare", table.fqn);
            return Ok(None);
        };

        // 5. Diff against the previous column set
        let old_columns: Vec<ColumnInfo> =
            serde_json::from_str(&last_snapshot.columns).unwrap_or_default();
        let changes = diff_schemas(&old_columns, &current_columns);
        if changes.is_empty() {
            return Ok(None);
        }
        let severity = classify_severity(&changes);

        tracing::warn!(
            "Schema drift detected on {}: {} change(s) (severity={})",
            table.fqn,
            changes.len(),
            severity.as_str()
        );

        let detail = serde_json::to_string(&AnomalyDetail::SchemaDrift(changes))?;
        let anomaly = insert_anomaly(pool, table.id, AnomalyKind::SchemaDrift, severity, &detail)
            .await?;
        Ok(Some(anomaly))
    }
}

/// Detects tables not updated within their freshness SLA.
pub struct FreshnessSentinel;

impl FreshnessSentinel {
    pub async fn inspect(
        &self,
        table: &MonitoredTable,
        connector: &dyn WarehouseConnector,
        pool: &SqlitePool,
    ) -> ApiResult<Option<Anomaly>> {
        let Some(sla_minutes) = table.freshness_sla_minutes else {
            return Ok(None);
        };
        if sla_minutes <= 0 {
            return Ok(None);
        }

        let last_update = match connector
            .fetch_last_update_time(&table.schema_name, &table.table_name)
            .await
        {
            Ok(Some(last_update)) => last_update,
            Ok(None) => {
                tracing::warn!("No timestamp found for {}", table.fqn);
                return Ok(None);
            },
            Err(e) => {
                tracing::error!("Failed to check freshness for {}: {}", table.fqn, e);
                return Ok(None);
            },
        };

        let now = Utc::now();
        let minutes_since = (now - last_update).num_seconds() as f64 / 60.0;

        if minutes_since <= sla_minutes as f64 {
            return Ok(None);
        }

        let minutes_overdue = round1(minutes_since - sla_minutes as f64);
        let severity = classify_freshness_severity(minutes_since, sla_minutes);

        tracing::warn!(
            "Freshness violation on {}: {:.0} min overdue (severity={})",
            table.fqn,
            minutes_overdue,
            severity.as_str()
        );

        let detail = serde_json::to_string(&AnomalyDetail::Freshness(FreshnessDetail {
            last_update,
            sla_minutes,
            minutes_overdue,
        }))?;
        let anomaly =
            insert_anomaly(pool, table.id, AnomalyKind::FreshnessViolation, severity, &detail)
                .await?;
        Ok(Some(anomaly))
    }
}

// ============================================================================
// Classification helpers
// ============================================================================

/// Compute the specific changes between two column lists, keyed by name.
fn diff_schemas(old: &[ColumnInfo], new: &[ColumnInfo]) -> Vec<SchemaChange> {
    let old_by_name: BTreeMap<&str, &ColumnInfo> =
        old.iter().map(|c| (c.name.as_str(), c)).collect();
    let new_by_name: BTreeMap<&str, &ColumnInfo> =
        new.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut changes = Vec::new();

    for column in old {
        if !new_by_name.contains_key(column.name.as_str()) {
            changes.push(SchemaChange::ColumnDeleted {
                column: column.name.clone(),
                old: column.clone(),
            });
        }
    }

    for column in new {
        if !old_by_name.contains_key(column.name.as_str()) {
            changes.push(SchemaChange::ColumnAdded {
                column: column.name.clone(),
                nullable: column.nullable,
                new: column.clone(),
            });
        }
    }

    for column in old {
        if let Some(new_column) = new_by_name.get(column.name.as_str()) {
            if column.data_type != new_column.data_type {
                changes.push(SchemaChange::TypeChanged {
                    column: column.name.clone(),
                    old_type: column.data_type.clone(),
                    new_type: new_column.data_type.clone(),
                });
            }
        }
    }

    changes
}

/// Overall severity is the worst individual change.
fn classify_severity(changes: &[SchemaChange]) -> Severity {
    changes
        .iter()
        .map(|change| match change {
            SchemaChange::ColumnDeleted { .. } => Severity::Critical,
            SchemaChange::TypeChanged { .. } => Severity::Critical,
            SchemaChange::ColumnAdded { nullable: true, .. } => Severity::Low,
            SchemaChange::ColumnAdded { nullable: false, .. } => Severity::Medium,
        })
        .max()
        .unwrap_or(Severity::Low)
}

fn classify_freshness_severity(minutes_since: f64, sla_minutes: i64) -> Severity {
    let ratio = minutes_since / sla_minutes as f64;
    if ratio > 5.0 {
        Severity::Critical
    } else if ratio > 2.0 {
        Severity::High
    } else {
        Severity::Medium
    }
}

// ============================================================================
// Persistence helpers
// ============================================================================

/// Canonical JSON: render through `serde_json::Value` so object keys come out
/// sorted, making the hash independent of struct field order.
pub fn canonicalize_columns(columns: &[ColumnInfo]) -> String {
    let value = serde_json::to_value(columns).unwrap_or(serde_json::Value::Array(Vec::new()));
    value.to_string()
}

pub fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

async fn insert_anomaly(
    pool: &SqlitePool,
    table_id: i64,
    kind: AnomalyKind,
    severity: Severity,
    detail: &str,
) -> ApiResult<Anomaly> {
    let result = sqlx::query(
        "INSERT INTO anomalies (table_id, kind, severity, detail, detected_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(table_id)
    .bind(kind)
    .bind(severity)
    .bind(detail)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    let anomaly: Anomaly = sqlx::query_as("SELECT * FROM anomalies WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await?;
    Ok(anomaly)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, data_type: &str, nullable: bool, ordinal: i64) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
            ordinal,
        }
    }

    #[test]
    fn canonical_json_is_stable_and_key_sorted() {
        let columns = vec![column("id", "INTEGER", false, 1)];
        let json = canonicalize_columns(&columns);
        assert_eq!(json, canonicalize_columns(&columns));
        // Keys appear alphabetically regardless of struct field order.
        let name_pos = json.find("\"name\"").unwrap();
        let nullable_pos = json.find("\"nullable\"").unwrap();
        let ordinal_pos = json.find("\"ordinal\"").unwrap();
        assert!(name_pos < nullable_pos && nullable_pos < ordinal_pos);
    }

    #[test]
    fn diff_detects_all_change_kinds() {
        let old = vec![
            column("id", "INTEGER", false, 1),
            column("price", "FLOAT", true, 2),
            column("name", "VARCHAR", true, 3),
        ];
        let new = vec![
            column("id", "BIGINT", false, 1),
            column("name", "VARCHAR", true, 2),
            column("created_at", "DATETIME", true, 3),
        ];

        let changes = diff_schemas(&old, &new);
        assert!(changes.iter().any(
            |c| matches!(c, SchemaChange::ColumnDeleted { column, .. } if column == "price")
        ));
        assert!(changes.iter().any(
            |c| matches!(c, SchemaChange::ColumnAdded { column, .. } if column == "created_at")
        ));
        assert!(changes.iter().any(
            |c| matches!(c, SchemaChange::TypeChanged { column, .. } if column == "id")
        ));
    }

    #[test]
    fn deleted_and_type_changes_are_critical() {
        let deleted = vec![SchemaChange::ColumnDeleted {
            column: "price".to_string(),
            old: column("price", "FLOAT", true, 2),
        }];
        assert_eq!(classify_severity(&deleted), Severity::Critical);

        let changed = vec![SchemaChange::TypeChanged {
            column: "id".to_string(),
            old_type: "INTEGER".to_string(),
            new_type: "VARCHAR".to_string(),
        }];
        assert_eq!(classify_severity(&changed), Severity::Critical);
    }

    #[test]
    fn added_column_severity_depends_on_nullability() {
        let nullable = vec![SchemaChange::ColumnAdded {
            column: "note".to_string(),
            nullable: true,
            new: column("note", "VARCHAR", true, 4),
        }];
        assert_eq!(classify_severity(&nullable), Severity::Low);

        let required = vec![SchemaChange::ColumnAdded {
            column: "amount".to_string(),
            nullable: false,
            new: column("amount", "DECIMAL", false, 4),
        }];
        assert_eq!(classify_severity(&required), Severity::Medium);
    }

    #[test]
    fn freshness_severity_thresholds() {
        assert_eq!(classify_freshness_severity(90.0, 60), Severity::Medium);
        assert_eq!(classify_freshness_severity(150.0, 60), Severity::High);
        assert_eq!(classify_freshness_severity(400.0, 60), Severity::Critical);
        // Boundary: exactly 2x stays medium, exactly 5x stays high.
        assert_eq!(classify_freshness_severity(120.0, 60), Severity::Medium);
        assert_eq!(classify_freshness_severity(300.0, 60), Severity::High);
    }
}
