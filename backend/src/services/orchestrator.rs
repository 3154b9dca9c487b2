//! Orchestrator — drives an anomaly through the incident lifecycle:
//! dedupe, create-or-merge, diagnosis, remediation, report, notification.

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::models::{Anomaly, Diagnosis, Incident, MonitoredTable, Remediation};
use crate::services::architect::Architect;
use crate::services::executor::Executor;
use crate::services::notifier::Notifier;
use crate::services::report_generator::ReportGenerator;
use crate::utils::ApiResult;

pub struct Orchestrator {
    pool: SqlitePool,
    architect: Architect,
    executor: Executor,
    report_generator: ReportGenerator,
    notifier: Arc<Notifier>,
}

impl Orchestrator {
    pub fn new(pool: SqlitePool, architect: Architect, notifier: Arc<Notifier>) -> Self {
        Self {
            pool,
            architect,
            executor: Executor,
            report_generator: ReportGenerator,
            notifier,
        }
    }

    /// Process one detected anomaly. Returns the open incident it landed in,
    /// freshly created or merged into.
    pub async fn handle_anomaly(&self, anomaly: &Anomaly) -> ApiResult<Incident> {
        // Dedupe check and incident insert share a transaction so concurrent
        // writers on the same (table, kind) serialize through the store and
        // at most one open incident exists per key.
        let mut tx = self.pool.begin().await?;

        let existing: Option<Incident> = sqlx::query_as(
            "SELECT i.* FROM incidents i \
             JOIN anomalies a ON a.id = i.anomaly_id \
             WHERE a.table_id = ? AND a.kind = ? \
               AND i.status IN ('open', 'investigating', 'pending_review') \
             ORDER BY i.created_at DESC, i.id DESC LIMIT 1",
        )
        .bind(anomaly.table_id)
        .bind(anomaly.kind)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(incident) = existing {
            tx.commit().await?;
            tracing::info!("Merging anomaly {} into existing incident {}", anomaly.id, incident.id);
            return self.merge_anomaly(incident, anomaly).await;
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO incidents (anomaly_id, status, severity, created_at, updated_at) \
             VALUES (?, 'investigating', ?, ?, ?)",
        )
        .bind(anomaly.id)
        .bind(anomaly.severity)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let incident_id = result.last_insert_rowid();
        tx.commit().await?;

        tracing::info!(
            "Created incident {} for anomaly {} (type={}, severity={})",
            incident_id,
            anomaly.id,
            anomaly.kind.as_str(),
            anomaly.severity.as_str()
        );

        // Root-cause analysis. A failure leaves the diagnosis empty and keeps
        // the anomaly's severity; the incident still moves forward.
        let mut diagnosis: Option<Diagnosis> = None;
        match self.architect.analyze(anomaly).await {
            Ok(result) => {
                // The LLM may escalate the incident but never downgrade it.
                let adopted = result.severity.max(anomaly.severity);
                sqlx::query(
                    "UPDATE incidents SET diagnosis = ?, blast_radius = ?, severity = ? \
                     WHERE id = ?",
                )
                .bind(serde_json::to_string(&result)?)
                .bind(serde_json::to_string(&result.blast_radius)?)
                .bind(adopted)
                .bind(incident_id)
                .execute(&self.pool)
                .await?;
                diagnosis = Some(result);
            },
            Err(e) => {
                tracing::error!("Architect analysis failed for incident {}: {}", incident_id, e);
            },
        }

        // Remediation synthesis, only when a diagnosis exists.
        let mut remediation: Option<Remediation> = None;
        if let Some(diagnosis) = &diagnosis {
            let plan = self.executor.prepare(anomaly, diagnosis);
            match serde_json::to_string(&plan) {
                Ok(serialized) => {
                    sqlx::query("UPDATE incidents SET remediation = ? WHERE id = ?")
                        .bind(serialized)
                        .bind(incident_id)
                        .execute(&self.pool)
                        .await?;
                    remediation = Some(plan);
                },
                Err(e) => {
                    tracing::error!(
                        "Executor preparation failed for incident {}: {}",
                        incident_id,
                        e
                    );
                },
            }
        }

        sqlx::query("UPDATE incidents SET status = 'pending_review', updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(incident_id)
            .execute(&self.pool)
            .await?;

        // Report assembly; a failure leaves the report column empty.
        if let Err(e) = self
            .generate_report(incident_id, anomaly, diagnosis.as_ref(), remediation.as_ref())
            .await
        {
            tracing::error!("Report generation failed for incident {}: {}", incident_id, e);
        }

        let incident: Incident = sqlx::query_as("SELECT * FROM incidents WHERE id = ?")
            .bind(incident_id)
            .fetch_one(&self.pool)
            .await?;

        self.notifier.broadcast(
            "incident.created",
            json!({ "incident_id": incident.id, "severity": incident.severity }),
        );

        Ok(incident)
    }

    /// Merge a repeat anomaly into the already-open incident for its key.
    /// Severity only ever escalates.
    async fn merge_anomaly(&self, incident: Incident, anomaly: &Anomaly) -> ApiResult<Incident> {
        let severity = incident.severity.max(anomaly.severity);

        sqlx::query("UPDATE incidents SET severity = ?, updated_at = ? WHERE id = ?")
            .bind(severity)
            .bind(Utc::now())
            .bind(incident.id)
            .execute(&self.pool)
            .await?;

        let incident: Incident = sqlx::query_as("SELECT * FROM incidents WHERE id = ?")
            .bind(incident.id)
            .fetch_one(&self.pool)
            .await?;

        self.notifier.broadcast(
            "incident.updated",
            json!({ "incident_id": incident.id, "severity": incident.severity }),
        );

        Ok(incident)
    }

    async fn generate_report(
        &self,
        incident_id: i64,
        anomaly: &Anomaly,
        diagnosis: Option<&Diagnosis>,
        remediation: Option<&Remediation>,
    ) -> ApiResult<()> {
        let incident: Incident = sqlx::query_as("SELECT * FROM incidents WHERE id = ?")
            .bind(incident_id)
            .fetch_one(&self.pool)
            .await?;
        let table: MonitoredTable = sqlx::query_as("SELECT * FROM monitored_tables WHERE id = ?")
            .bind(anomaly.table_id)
            .fetch_one(&self.pool)
            .await?;

        let report =
            self.report_generator.generate(&incident, anomaly, &table, diagnosis, remediation);

        sqlx::query("UPDATE incidents SET report = ? WHERE id = ?")
            .bind(serde_json::to_string(&report)?)
            .bind(incident_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
