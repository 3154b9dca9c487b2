//! Scan scheduler — the background driver of the detection pipeline.
//!
//! Two cadences run concurrently: the scan cycle (sentinels over every
//! monitored table) and the lineage refresh (query-log ingestion). Both run
//! immediately at boot and then on their configured intervals. A failing
//! connection or table is logged and skipped; a cycle always runs to
//! completion, and cancellation is only observed between cycles.

use serde_json::json;
use sqlx::SqlitePool;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::models::{CheckType, Connection};
use crate::services::connection_service::ConnectionService;
use crate::services::connector::{ConnectorPoolManager, create_connector};
use crate::services::lineage::LineageRefresher;
use crate::services::notifier::Notifier;
use crate::services::orchestrator::Orchestrator;
use crate::services::sentinel::{FreshnessSentinel, SchemaSentinel};
use crate::utils::scheduled_executor::{ScheduledExecutor, ScheduledTask};
use crate::utils::ApiResult;

pub struct Scanner {
    pool: SqlitePool,
    pool_manager: Arc<ConnectorPoolManager>,
    connection_service: Arc<ConnectionService>,
    orchestrator: Arc<Orchestrator>,
    notifier: Arc<Notifier>,
}

impl Scanner {
    pub fn new(
        pool: SqlitePool,
        pool_manager: Arc<ConnectorPoolManager>,
        connection_service: Arc<ConnectionService>,
        orchestrator: Arc<Orchestrator>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self { pool, pool_manager, connection_service, orchestrator, notifier }
    }

    /// One full scan cycle over all active connections. Returns
    /// `(tables_scanned, anomalies_found)`.
    pub async fn run_scan_cycle(&self) -> ApiResult<(i64, i64)> {
        let schema_sentinel = SchemaSentinel;
        let freshness_sentinel = FreshnessSentinel;

        let connections = self.connection_service.list_active_connections().await?;

        let mut total_tables: i64 = 0;
        let mut total_anomalies: i64 = 0;

        for connection in &connections {
            let connector = match self.open_connector(connection) {
                Ok(connector) => connector,
                Err(e) => {
                    tracing::error!("Failed to connect to {}: {}", connection.name, e);
                    continue;
                },
            };

            let tables = match sqlx::query_as::<_, crate::models::MonitoredTable>(
                "SELECT * FROM monitored_tables WHERE connection_id = ? ORDER BY id",
            )
            .bind(connection.id)
            .fetch_all(&self.pool)
            .await
            {
                Ok(tables) => tables,
                Err(e) => {
                    tracing::error!("Failed to list tables for {}: {}", connection.name, e);
                    connector.dispose().await;
                    continue;
                },
            };

            for table in &tables {
                total_tables += 1;
                let checks = table.parsed_check_types();

                // Schema before freshness within a cycle.
                if checks.contains(&CheckType::Schema) {
                    match schema_sentinel.inspect(table, connector.as_ref(), &self.pool).await {
                        Ok(Some(anomaly)) => {
                            total_anomalies += 1;
                            if let Err(e) = self.orchestrator.handle_anomaly(&anomaly).await {
                                tracing::error!(
                                    "Orchestration failed for anomaly {}: {}",
                                    anomaly.id,
                                    e
                                );
                            }
                        },
                        Ok(None) => {},
                        Err(e) => {
                            tracing::error!("Schema check failed for {}: {}", table.fqn, e);
                        },
                    }
                }

                if checks.contains(&CheckType::Freshness) {
                    match freshness_sentinel.inspect(table, connector.as_ref(), &self.pool).await {
                        Ok(Some(anomaly)) => {
                            total_anomalies += 1;
                            if let Err(e) = self.orchestrator.handle_anomaly(&anomaly).await {
                                tracing::error!(
                                    "Orchestration failed for anomaly {}: {}",
                                    anomaly.id,
                                    e
                                );
                            }
                        },
                        Ok(None) => {},
                        Err(e) => {
                            tracing::error!("Freshness check failed for {}: {}", table.fqn, e);
                        },
                    }
                }
            }

            connector.dispose().await;
        }

        tracing::info!(
            "Scan cycle complete: {} tables scanned, {} anomalies found",
            total_tables,
            total_anomalies
        );

        self.notifier.broadcast(
            "scan.completed",
            json!({ "tables_scanned": total_tables, "anomalies_found": total_anomalies }),
        );

        Ok((total_tables, total_anomalies))
    }

    /// Refresh lineage edges from every active connection's query log.
    pub async fn run_lineage_refresh(&self) -> ApiResult<u64> {
        let connections = self.connection_service.list_active_connections().await?;
        let refresher = LineageRefresher::new(self.pool.clone());

        let mut total_edges: u64 = 0;
        for connection in &connections {
            match self.open_connector(connection) {
                Ok(connector) => {
                    total_edges += refresher.refresh(connector.as_ref(), None).await;
                    connector.dispose().await;
                },
                Err(e) => {
                    tracing::error!("Lineage refresh failed for {}: {}", connection.name, e);
                },
            }
        }

        tracing::info!("Lineage refresh complete: {} edges updated", total_edges);
        Ok(total_edges)
    }

    fn open_connector(
        &self,
        connection: &Connection,
    ) -> ApiResult<Box<dyn crate::services::connector::WarehouseConnector>> {
        let uri = self.connection_service.reveal_uri(connection)?;
        create_connector(connection, &uri, Arc::clone(&self.pool_manager))
    }
}

// ============================================================================
// Scheduled task wiring
// ============================================================================

struct ScanCycleTask {
    scanner: Arc<Scanner>,
    shutdown: Arc<AtomicBool>,
}

impl ScheduledTask for ScanCycleTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move {
            self.scanner.run_scan_cycle().await.map_err(|e| anyhow::anyhow!("{}", e))?;
            Ok(())
        })
    }

    fn should_terminate(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

struct LineageRefreshTask {
    scanner: Arc<Scanner>,
    shutdown: Arc<AtomicBool>,
}

impl ScheduledTask for LineageRefreshTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move {
            self.scanner.run_lineage_refresh().await.map_err(|e| anyhow::anyhow!("{}", e))?;
            Ok(())
        })
    }

    fn should_terminate(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// Start the scan cycle on its cadence. Returns the shutdown handle; setting
/// it aborts at the next cycle boundary.
pub fn start_scan_task(scanner: Arc<Scanner>, interval_secs: u64) -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let task = ScanCycleTask { scanner, shutdown: Arc::clone(&shutdown) };
    let executor = ScheduledExecutor::new("scan-cycle", Duration::from_secs(interval_secs));

    tokio::spawn(async move {
        executor.start(task).await;
    });

    tracing::info!("Scan task started with interval: {}s", interval_secs);
    shutdown
}

/// Start the lineage refresh on its own cadence; the first run happens
/// immediately.
pub fn start_lineage_refresh_task(scanner: Arc<Scanner>, interval_secs: u64) -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let task = LineageRefreshTask { scanner, shutdown: Arc::clone(&shutdown) };
    let executor = ScheduledExecutor::new("lineage-refresh", Duration::from_secs(interval_secs));

    tokio::spawn(async move {
        executor.start(task).await;
    });

    tracing::info!("Lineage refresh task started with interval: {}s", interval_secs);
    shutdown
}
