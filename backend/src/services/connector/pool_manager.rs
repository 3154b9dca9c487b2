use dashmap::DashMap;
use mysql_async::{Opts, Pool};
use std::sync::Arc;

use crate::utils::{ApiError, ApiResult};

/// Manager for MySQL-protocol connection pools using DashMap.
///
/// Maintains one pool per connection id so scan cycles do not pay a fresh
/// handshake on every tick. Pools are evicted when a connection is updated
/// or deleted; connector instances themselves are never cached.
#[derive(Clone, Default)]
pub struct ConnectorPoolManager {
    pools: Arc<DashMap<i64, Pool>>,
}

impl ConnectorPoolManager {
    pub fn new() -> Self {
        Self { pools: Arc::new(DashMap::new()) }
    }

    /// Get or create a pool for the given connection.
    ///
    /// Fast path: pool exists, return a clone (lock-free read).
    pub fn get_pool(&self, connection_id: i64, uri: &str) -> ApiResult<Pool> {
        if let Some(pool) = self.pools.get(&connection_id) {
            return Ok(pool.clone());
        }

        let opts = Opts::from_url(uri).map_err(|e| {
            ApiError::warehouse_connection_failed(format!("Invalid connection URI: {}", e))
        })?;
        let pool = Pool::new(opts);

        self.pools.insert(connection_id, pool.clone());
        tracing::info!("Created warehouse connection pool for connection {}", connection_id);

        Ok(pool)
    }

    /// Drop the pool for a connection, closing its sockets in the background.
    /// Called when a connection's URI or credentials change, or it is deleted.
    pub fn remove_pool(&self, connection_id: i64) {
        if let Some((_, pool)) = self.pools.remove(&connection_id) {
            tokio::spawn(async move {
                if let Err(e) = pool.disconnect().await {
                    tracing::debug!(
                        "Error while disconnecting pool for connection {}: {}",
                        connection_id,
                        e
                    );
                }
            });
            tracing::info!("Removed warehouse connection pool for connection {}", connection_id);
        }
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }
}
