use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::models::StatsResponse;
use crate::utils::ApiResult;

#[derive(Clone)]
pub struct StatsService {
    pool: SqlitePool,
}

impl StatsService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Platform-wide aggregation for the dashboard: table health, open
    /// incident counts, recent anomaly volume, resolution latency.
    pub async fn stats(&self) -> ApiResult<StatsResponse> {
        let (total_tables,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM monitored_tables")
                .fetch_one(&self.pool)
                .await?;

        let (open_incidents,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM incidents \
             WHERE status IN ('open', 'investigating', 'pending_review')",
        )
        .fetch_one(&self.pool)
        .await?;

        let (critical_incidents,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM incidents \
             WHERE status IN ('open', 'investigating', 'pending_review') \
               AND severity = 'critical'",
        )
        .fetch_one(&self.pool)
        .await?;

        let since_24h = Utc::now() - Duration::hours(24);
        let (anomalies_24h,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM anomalies WHERE detected_at >= ?")
                .bind(since_24h)
                .fetch_one(&self.pool)
                .await?;

        let (tables_with_incidents,): (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT a.table_id) FROM anomalies a \
             JOIN incidents i ON i.anomaly_id = a.id \
             WHERE i.status IN ('open', 'investigating', 'pending_review')",
        )
        .fetch_one(&self.pool)
        .await?;

        let healthy_tables = total_tables - tables_with_incidents;
        let health_score = if total_tables > 0 {
            round1(healthy_tables as f64 / total_tables as f64 * 100.0)
        } else {
            100.0
        };

        let (avg_days,): (Option<f64>,) = sqlx::query_as(
            "SELECT AVG(julianday(resolved_at) - julianday(created_at)) \
             FROM incidents WHERE resolved_at IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        let avg_resolution_time_minutes = avg_days.map(|days| round1(days * 24.0 * 60.0));

        Ok(StatsResponse {
            health_score,
            total_tables,
            healthy_tables,
            open_incidents,
            critical_incidents,
            anomalies_24h,
            avg_resolution_time_minutes,
        })
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
