//! Discovery — rule-based warehouse exploration.
//!
//! `discover` classifies every table in the warehouse and proposes a
//! monitoring configuration; `rediscover` diffs the live catalog against the
//! enrolled tables. Both are read-only: enrollment stays an operator action.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::BTreeSet;

use crate::models::{
    CheckType, ColumnInfo, Connection, DeltaAction, DiscoveryReport, TableDelta, TableProposal,
    TableRole,
};
use crate::services::connector::WarehouseConnector;
use crate::utils::ApiResult;

/// Column names that indicate a usable freshness timestamp.
const TIMESTAMP_COLUMNS: [&str; 5] =
    ["updated_at", "modified_at", "created_at", "_loaded_at", "_etl_loaded_at"];

const STAGING_SLA_MINUTES: i64 = 60;
const CORE_SLA_MINUTES: i64 = 360;
const RAW_SLA_MINUTES: i64 = 1440;

#[derive(Clone)]
pub struct DiscoveryService {
    pool: SqlitePool,
}

impl DiscoveryService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Walk the warehouse catalog and classify every table.
    pub async fn discover(
        &self,
        connection: &Connection,
        connector: &dyn WarehouseConnector,
    ) -> ApiResult<DiscoveryReport> {
        let mut proposals = Vec::new();
        let mut schemas_found = Vec::new();

        for schema in connector.list_schemas().await? {
            schemas_found.push(schema.clone());
            for table_info in connector.list_tables(&schema).await? {
                let fqn = format!("{}.{}", schema, table_info.name);

                let columns = match connector.fetch_schema(&schema, &table_info.name).await {
                    Ok(columns) => columns,
                    Err(e) => {
                        tracing::warn!("Could not inspect columns of {}: {}", fqn, e);
                        Vec::new()
                    },
                };

                let classification = classify_by_rules(&schema, &table_info.name, &columns);

                proposals.push(TableProposal {
                    schema_name: schema.clone(),
                    table_name: table_info.name,
                    fqn,
                    role: classification.role,
                    columns,
                    recommended_checks: classification.checks,
                    suggested_sla_minutes: classification.sla_minutes,
                    reasoning: classification.reasoning,
                    skip: classification.skip,
                });
            }
        }

        schemas_found.sort();

        Ok(DiscoveryReport {
            connection_id: connection.id,
            connection_name: connection.name.clone(),
            schemas_found,
            total_tables: proposals.len() as i64,
            proposals,
            concerns: Vec::new(),
            generated_at: Utc::now(),
        })
    }

    /// Compare the live catalog against enrolled tables. Never mutates.
    pub async fn rediscover(
        &self,
        connection_id: i64,
        connector: &dyn WarehouseConnector,
    ) -> ApiResult<Vec<TableDelta>> {
        let mut warehouse_fqns: BTreeSet<String> = BTreeSet::new();
        for schema in connector.list_schemas().await? {
            for table_info in connector.list_tables(&schema).await? {
                warehouse_fqns.insert(format!("{}.{}", schema, table_info.name));
            }
        }

        let monitored: Vec<(String,)> =
            sqlx::query_as("SELECT fqn FROM monitored_tables WHERE connection_id = ?")
                .bind(connection_id)
                .fetch_all(&self.pool)
                .await?;
        let monitored_fqns: BTreeSet<String> =
            monitored.into_iter().map(|(fqn,)| fqn).collect();

        let mut deltas = Vec::new();

        for fqn in warehouse_fqns.difference(&monitored_fqns) {
            deltas.push(make_delta(DeltaAction::New, fqn));
        }
        for fqn in monitored_fqns.difference(&warehouse_fqns) {
            deltas.push(make_delta(DeltaAction::Dropped, fqn));
        }

        Ok(deltas)
    }
}

fn make_delta(action: DeltaAction, fqn: &str) -> TableDelta {
    let (schema_name, table_name) = match fqn.split_once('.') {
        Some((schema, table)) => (schema.to_string(), table.to_string()),
        None => ("default".to_string(), fqn.to_string()),
    };
    TableDelta { action, schema_name, table_name, fqn: fqn.to_string() }
}

struct Classification {
    role: TableRole,
    checks: Vec<CheckType>,
    sla_minutes: Option<i64>,
    reasoning: String,
    skip: bool,
}

/// Deterministic heuristics on names, schemas, and timestamp columns.
fn classify_by_rules(schema: &str, table_name: &str, columns: &[ColumnInfo]) -> Classification {
    let name_lower = table_name.to_lowercase();
    let schema_lower = schema.to_lowercase();
    let has_timestamp = columns
        .iter()
        .any(|column| TIMESTAMP_COLUMNS.contains(&column.name.to_lowercase().as_str()));

    if ["_tmp", "_temp", "_test", "_backup"].iter().any(|prefix| name_lower.starts_with(prefix)) {
        return Classification {
            role: TableRole::System,
            checks: Vec::new(),
            sla_minutes: None,
            reasoning: format!("Temporary table ({}* prefix)", &name_lower[..5.min(name_lower.len())]),
            skip: true,
        };
    }

    if name_lower.starts_with("stg_") || matches!(schema_lower.as_str(), "staging" | "stg") {
        return Classification {
            role: TableRole::Staging,
            checks: vec![CheckType::Schema],
            sla_minutes: Some(STAGING_SLA_MINUTES),
            reasoning: format!("Staging table in {}", schema),
            skip: false,
        };
    }

    if name_lower.starts_with("raw_") || matches!(schema_lower.as_str(), "raw" | "landing") {
        return Classification {
            role: TableRole::Raw,
            checks: vec![CheckType::Schema],
            sla_minutes: Some(RAW_SLA_MINUTES),
            reasoning: format!("Raw ingestion table in {}", schema),
            skip: false,
        };
    }

    if name_lower.starts_with("dim_") {
        return core_table(TableRole::Dimension, "Dimension table (dim_ prefix)", has_timestamp);
    }

    if name_lower.starts_with("fct_") || name_lower.starts_with("fact_") {
        return core_table(TableRole::Fact, "Fact table (fct_ prefix)", has_timestamp);
    }

    if ["_snapshot", "_hist", "_history"].iter().any(|suffix| name_lower.ends_with(suffix)) {
        return Classification {
            role: TableRole::Snapshot,
            checks: vec![CheckType::Schema],
            sla_minutes: None,
            reasoning: "Snapshot/history table".to_string(),
            skip: false,
        };
    }

    if has_timestamp {
        Classification {
            role: TableRole::Unknown,
            checks: vec![CheckType::Schema, CheckType::Freshness],
            sla_minutes: None,
            reasoning: "Has timestamp columns; role unknown".to_string(),
            skip: false,
        }
    } else {
        Classification {
            role: TableRole::Unknown,
            checks: vec![CheckType::Schema],
            sla_minutes: None,
            reasoning: "No timestamp columns detected; role unknown".to_string(),
            skip: false,
        }
    }
}

fn core_table(role: TableRole, reasoning: &str, has_timestamp: bool) -> Classification {
    Classification {
        role,
        checks: if has_timestamp {
            vec![CheckType::Schema, CheckType::Freshness]
        } else {
            vec![CheckType::Schema]
        },
        sla_minutes: has_timestamp.then_some(CORE_SLA_MINUTES),
        reasoning: reasoning.to_string(),
        skip: false,
    }
}
