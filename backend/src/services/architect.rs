//! Architect — root-cause analysis with an LLM primary path and a
//! deterministic rule-based fallback.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::models::{
    Anomaly, AnomalyDetail, Diagnosis, MonitoredTable, Recommendation, SchemaChange,
};
use crate::services::lineage::LineageGraph;
use crate::services::llm::LlmService;
use crate::utils::ApiResult;

/// Lineage context depth used for prompt enrichment.
const PROMPT_LINEAGE_DEPTH: i64 = 3;
/// Recent anomalies included in the prompt.
const PROMPT_HISTORY_LIMIT: i64 = 5;
/// Blast-radius depth for the rule-based fallback.
const FALLBACK_BLAST_DEPTH: i64 = 10;

pub struct Architect {
    pool: SqlitePool,
    lineage: LineageGraph,
    llm: Arc<dyn LlmService>,
}

impl Architect {
    pub fn new(pool: SqlitePool, lineage: LineageGraph, llm: Arc<dyn LlmService>) -> Self {
        Self { pool, lineage, llm }
    }

    /// Perform root-cause analysis on an anomaly.
    pub async fn analyze(&self, anomaly: &Anomaly) -> ApiResult<Diagnosis> {
        let prompt = self.build_prompt(anomaly).await?;

        if self.llm.is_available() {
            if let Some(payload) = self.llm.diagnose(&prompt).await {
                match parse_diagnosis(payload) {
                    Ok(diagnosis) => return Ok(diagnosis),
                    Err(e) => {
                        tracing::warn!("Failed to parse LLM diagnosis, falling back to rules: {}", e);
                    },
                }
            }
        }

        self.rule_based_fallback(anomaly).await
    }

    /// Construct the prompt with anomaly, lineage, and history context.
    async fn build_prompt(&self, anomaly: &Anomaly) -> ApiResult<String> {
        let table: Option<MonitoredTable> =
            sqlx::query_as("SELECT * FROM monitored_tables WHERE id = ?")
                .bind(anomaly.table_id)
                .fetch_optional(&self.pool)
                .await?;
        let table_name = table
            .map(|t| t.fqn)
            .unwrap_or_else(|| format!("table_id={}", anomaly.table_id));

        let mut sections = Vec::new();

        // Anomaly section
        let mut anomaly_section =
            format!("## Anomaly\nType: {}\nTable: {}", anomaly.kind.as_str(), table_name);
        match anomaly.parsed_detail() {
            Some(AnomalyDetail::SchemaDrift(changes)) => {
                let lines: Vec<String> = changes.iter().map(describe_change).collect();
                anomaly_section.push_str(&format!("\nChanges:\n{}", lines.join("\n")));
            },
            Some(AnomalyDetail::Freshness(detail)) => {
                let pretty = serde_json::to_string_pretty(&detail).unwrap_or_default();
                anomaly_section.push_str(&format!("\nDetail: {}", pretty));
            },
            None => {
                anomaly_section.push_str(&format!("\nDetail: {}", anomaly.detail));
            },
        }
        anomaly_section.push_str(&format!("\nDetected: {}", anomaly.detected_at.to_rfc3339()));
        sections.push(anomaly_section);

        // Lineage section
        let upstream = self.lineage.upstream(&table_name, PROMPT_LINEAGE_DEPTH).await;
        let downstream = self.lineage.downstream(&table_name, PROMPT_LINEAGE_DEPTH).await;
        match (upstream, downstream) {
            (Ok(upstream), Ok(downstream)) if !upstream.is_empty() || !downstream.is_empty() => {
                let mut parts = Vec::new();
                if !upstream.is_empty() {
                    let chain: Vec<&str> = upstream.iter().map(|n| n.fqn.as_str()).collect();
                    parts.push(format!("Upstream: {}", chain.join(" -> ")));
                }
                parts.push(table_name.clone());
                if !downstream.is_empty() {
                    let list: Vec<&str> = downstream.iter().map(|n| n.fqn.as_str()).collect();
                    parts.push(format!("Downstream: {}", list.join(", ")));
                }
                sections.push(format!("## Lineage\n{}", parts.join(" -> ")));
            },
            (Err(e), _) | (_, Err(e)) => {
                tracing::debug!("Could not load lineage for prompt: {}", e);
            },
            _ => {},
        }

        // Recent history, newest first, excluding the anomaly at hand
        let recent: Vec<Anomaly> = sqlx::query_as(
            "SELECT * FROM anomalies WHERE table_id = ? AND id != ? \
             ORDER BY detected_at DESC, id DESC LIMIT ?",
        )
        .bind(anomaly.table_id)
        .bind(anomaly.id)
        .bind(PROMPT_HISTORY_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        if !recent.is_empty() {
            let lines: Vec<String> = recent
                .iter()
                .map(|a| {
                    format!(
                        "- {} ({}) at {}",
                        a.kind.as_str(),
                        a.severity.as_str(),
                        a.detected_at.to_rfc3339()
                    )
                })
                .collect();
            sections.push(format!("## Recent History\n{}", lines.join("\n")));
        }

        Ok(sections.join("\n\n"))
    }

    /// Deterministic diagnosis for when the LLM is unavailable or unusable.
    async fn rule_based_fallback(&self, anomaly: &Anomaly) -> ApiResult<Diagnosis> {
        let table: Option<MonitoredTable> =
            sqlx::query_as("SELECT * FROM monitored_tables WHERE id = ?")
                .bind(anomaly.table_id)
                .fetch_optional(&self.pool)
                .await?;
        let table_name = table.map(|t| t.fqn).unwrap_or_else(|| "unknown".to_string());

        let blast_radius = match self.lineage.downstream(&table_name, FALLBACK_BLAST_DEPTH).await {
            Ok(nodes) => nodes.into_iter().map(|node| node.fqn).collect(),
            Err(_) => Vec::new(),
        };

        Ok(Diagnosis {
            root_cause: "Automated analysis unavailable. Manual investigation required."
                .to_string(),
            root_cause_table: table_name,
            blast_radius,
            severity: anomaly.severity,
            confidence: 0.0,
            recommendations: vec![Recommendation {
                action: "investigate".to_string(),
                description: "Check upstream tables for recent changes".to_string(),
                sql: None,
                priority: 1,
            }],
        })
    }
}

/// Validate the required fields, then let serde fill in the defaults.
fn parse_diagnosis(payload: serde_json::Value) -> Result<Diagnosis, anyhow::Error> {
    for field in ["root_cause", "root_cause_table"] {
        if !payload.get(field).map(|v| v.is_string()).unwrap_or(false) {
            anyhow::bail!("missing required field '{}'", field);
        }
    }
    Ok(serde_json::from_value(payload)?)
}

fn describe_change(change: &SchemaChange) -> String {
    match change {
        SchemaChange::ColumnDeleted { column, .. } => {
            format!("- column_deleted: column `{}`", column)
        },
        SchemaChange::ColumnAdded { column, nullable, .. } => {
            format!("- column_added: column `{}` (nullable: {})", column, nullable)
        },
        SchemaChange::TypeChanged { column, old_type, new_type } => {
            format!("- type_changed: column `{}` type {} -> {}", column, old_type, new_type)
        },
    }
}
