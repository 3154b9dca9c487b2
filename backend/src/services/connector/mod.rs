// Warehouse connector module
// Purpose: unified interface over warehouse protocols; the rest of the
// pipeline treats a connector as an opaque capability.

mod mysql;
mod pool_manager;

pub use mysql::MySqlConnector;
pub use pool_manager::ConnectorPoolManager;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::models::{ColumnInfo, Connection, Dialect, TableInfo};
use crate::utils::{ApiError, ApiResult};

/// One statement pulled from the warehouse query log.
#[derive(Debug, Clone)]
pub struct QueryLogEntry {
    pub sql: String,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Capability exposed by every warehouse driver.
///
/// Connector instances are owned by the scan cycle (or request) that created
/// them and are disposed on exit; only the protocol-level connection pools
/// outlive a cycle.
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// User schemas, with system schemas filtered per dialect.
    async fn list_schemas(&self) -> ApiResult<Vec<String>>;

    async fn list_tables(&self, schema: &str) -> ApiResult<Vec<TableInfo>>;

    /// Column metadata in ordinal order.
    async fn fetch_schema(&self, schema: &str, table: &str) -> ApiResult<Vec<ColumnInfo>>;

    /// Most recent modification timestamp, when the warehouse tracks one.
    async fn fetch_last_update_time(
        &self,
        schema: &str,
        table: &str,
    ) -> ApiResult<Option<DateTime<Utc>>>;

    async fn test_connection(&self) -> bool;

    /// Query-log entries newer than `since`; `None` when the dialect has no
    /// usable query log.
    async fn fetch_query_log(
        &self,
        since: DateTime<Utc>,
    ) -> ApiResult<Option<Vec<QueryLogEntry>>>;

    /// Release the connector's handle on protocol resources.
    async fn dispose(&self);
}

/// Factory: build a connector for a connection using its plaintext URI.
pub fn create_connector(
    connection: &Connection,
    uri: &str,
    pool_manager: Arc<ConnectorPoolManager>,
) -> ApiResult<Box<dyn WarehouseConnector>> {
    match connection.dialect {
        Dialect::Mysql | Dialect::Starrocks | Dialect::Doris => Ok(Box::new(
            MySqlConnector::new(connection.id, connection.dialect, uri, pool_manager)?,
        )),
        other => Err(ApiError::invalid_input(format!(
            "No connector driver available for dialect '{}'",
            other
        ))),
    }
}
