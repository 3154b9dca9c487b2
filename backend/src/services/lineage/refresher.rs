//! Query-log ingestion: parse statements, upsert lineage edges.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use super::parser::extract_edges;
use crate::services::connector::WarehouseConnector;
use crate::utils::ApiResult;

/// Default lookback when the caller does not supply `since`.
const DEFAULT_LOOKBACK_HOURS: i64 = 2;

#[derive(Clone)]
pub struct LineageRefresher {
    pool: SqlitePool,
}

impl LineageRefresher {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Pull query-log entries newer than `since` and upsert the edges they
    /// imply. Returns the number of edge upserts. Extraction failures are
    /// logged and skipped; this never fails the surrounding cycle.
    pub async fn refresh(
        &self,
        connector: &dyn WarehouseConnector,
        since: Option<DateTime<Utc>>,
    ) -> u64 {
        let since = since.unwrap_or_else(|| Utc::now() - Duration::hours(DEFAULT_LOOKBACK_HOURS));

        let entries = match connector.fetch_query_log(since).await {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                tracing::warn!(
                    "No query log extractor for dialect: {}",
                    connector.dialect()
                );
                return 0;
            },
            Err(e) => {
                tracing::error!("Failed to extract query logs: {}", e);
                return 0;
            },
        };

        let entry_count = entries.len();
        let now = Utc::now();
        let mut edge_count: u64 = 0;

        for entry in &entries {
            for edge in extract_edges(&entry.sql, connector.dialect()) {
                match self
                    .upsert_edge(&edge.source, &edge.target, edge.confidence, &entry.sql, now)
                    .await
                {
                    Ok(()) => edge_count += 1,
                    Err(e) => {
                        tracing::error!(
                            "Failed to upsert edge {} -> {}: {}",
                            edge.source,
                            edge.target,
                            e
                        );
                    },
                }
            }
        }

        tracing::info!(
            "Refreshed {} lineage edges from {} query log entries",
            edge_count,
            entry_count
        );
        edge_count
    }

    /// Insert or refresh one edge. `last_seen_at` moves forward, confidence
    /// only ratchets up, and the query hash tracks the latest statement.
    pub async fn upsert_edge(
        &self,
        source: &str,
        target: &str,
        confidence: f64,
        sql: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<()> {
        let query_hash = hash_query(sql);

        sqlx::query(
            "INSERT INTO lineage_edges \
             (source_fqn, target_fqn, relationship, query_hash, confidence, first_seen_at, last_seen_at) \
             VALUES (?, ?, 'direct', ?, ?, ?, ?) \
             ON CONFLICT (source_fqn, target_fqn) DO UPDATE SET \
                 last_seen_at = excluded.last_seen_at, \
                 confidence = MAX(confidence, excluded.confidence), \
                 query_hash = excluded.query_hash",
        )
        .bind(source)
        .bind(target)
        .bind(&query_hash)
        .bind(confidence)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn hash_query(sql: &str) -> String {
    let digest = Sha256::digest(sql.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}
