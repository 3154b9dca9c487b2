use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;

use crate::models::{Incident, IncidentStatus, Severity};
use crate::services::notifier::Notifier;
use crate::utils::{ApiError, ApiResult};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Filters for the incident listing; all optional, combined with AND.
#[derive(Debug, Default, Deserialize)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub severity: Option<Severity>,
    pub table_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Clone)]
pub struct IncidentService {
    pool: SqlitePool,
    notifier: Arc<Notifier>,
}

impl IncidentService {
    pub fn new(pool: SqlitePool, notifier: Arc<Notifier>) -> Self {
        Self { pool, notifier }
    }

    pub async fn list_incidents(&self, filter: IncidentFilter) -> ApiResult<Vec<Incident>> {
        let page = filter.page.unwrap_or(1).max(1);
        let per_page = filter.per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT i.* FROM incidents i");
        if filter.table_id.is_some() {
            qb.push(" JOIN anomalies a ON a.id = i.anomaly_id");
        }
        qb.push(" WHERE 1 = 1");
        if let Some(status) = filter.status {
            qb.push(" AND i.status = ").push_bind(status);
        }
        if let Some(severity) = filter.severity {
            qb.push(" AND i.severity = ").push_bind(severity);
        }
        if let Some(table_id) = filter.table_id {
            qb.push(" AND a.table_id = ").push_bind(table_id);
        }
        if let Some(since) = filter.since {
            qb.push(" AND i.created_at >= ").push_bind(since);
        }
        qb.push(" ORDER BY i.created_at DESC, i.id DESC");
        qb.push(" LIMIT ").push_bind(per_page);
        qb.push(" OFFSET ").push_bind((page - 1) * per_page);

        let incidents: Vec<Incident> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(incidents)
    }

    pub async fn get_incident(&self, id: i64) -> ApiResult<Incident> {
        let incident: Option<Incident> = sqlx::query_as("SELECT * FROM incidents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        incident.ok_or_else(|| ApiError::not_found("Incident"))
    }

    /// The stored report document, or None when generation never succeeded.
    pub async fn get_report(&self, id: i64) -> ApiResult<Option<serde_json::Value>> {
        let incident = self.get_incident(id).await?;
        match incident.report {
            None => Ok(None),
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        }
    }

    /// Operator approval: `open set -> resolved`. Terminal incidents stay put.
    pub async fn approve_incident(
        &self,
        id: i64,
        resolved_by: Option<String>,
    ) -> ApiResult<Incident> {
        let incident = self.get_incident(id).await?;
        if !incident.status.is_open() {
            return Err(ApiError::conflict("Incident is already closed"));
        }

        let resolved_by = resolved_by.unwrap_or_else(|| "api_user".to_string());
        sqlx::query(
            "UPDATE incidents SET status = 'resolved', resolved_at = ?, resolved_by = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(&resolved_by)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        let incident = self.get_incident(id).await?;
        self.notifier.broadcast(
            "incident.updated",
            json!({ "incident_id": incident.id, "status": "resolved" }),
        );
        Ok(incident)
    }

    /// Operator dismissal with a reason. Also terminal.
    pub async fn dismiss_incident(&self, id: i64, reason: String) -> ApiResult<Incident> {
        let incident = self.get_incident(id).await?;
        if !incident.status.is_open() {
            return Err(ApiError::conflict("Incident is already closed"));
        }

        sqlx::query(
            "UPDATE incidents SET status = 'dismissed', dismiss_reason = ?, resolved_at = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(&reason)
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        let incident = self.get_incident(id).await?;
        self.notifier.broadcast(
            "incident.updated",
            json!({ "incident_id": incident.id, "status": "dismissed" }),
        );
        Ok(incident)
    }
}
