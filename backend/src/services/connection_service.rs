use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::models::{
    Connection, ConnectionTestResponse, CreateConnectionRequest, UpdateConnectionRequest,
};
use crate::services::connector::{ConnectorPoolManager, create_connector};
use crate::utils::{ApiError, ApiResult, SecretBox};

#[derive(Clone)]
pub struct ConnectionService {
    pool: SqlitePool,
    secret_box: Option<Arc<SecretBox>>,
    pool_manager: Arc<ConnectorPoolManager>,
}

impl ConnectionService {
    pub fn new(
        pool: SqlitePool,
        secret_box: Option<Arc<SecretBox>>,
        pool_manager: Arc<ConnectorPoolManager>,
    ) -> Self {
        Self { pool, secret_box, pool_manager }
    }

    pub async fn create_connection(&self, mut req: CreateConnectionRequest) -> ApiResult<Connection> {
        req.name = req.name.trim().to_string();
        req.uri = req.uri.trim().to_string();

        if req.name.is_empty() {
            return Err(ApiError::validation_error("Connection name cannot be empty"));
        }
        if req.uri.is_empty() {
            return Err(ApiError::validation_error("Connection URI cannot be empty"));
        }

        let existing: Option<Connection> =
            sqlx::query_as("SELECT * FROM connections WHERE name = ?")
                .bind(&req.name)
                .fetch_optional(&self.pool)
                .await?;
        if existing.is_some() {
            return Err(ApiError::conflict("Connection name already exists"));
        }

        let stored_uri = self.seal_uri(&req.uri)?;
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO connections (name, dialect, uri, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&req.name)
        .bind(req.dialect)
        .bind(&stored_uri)
        .bind(req.is_active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let connection: Connection = sqlx::query_as("SELECT * FROM connections WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await?;

        tracing::info!(
            "Connection created: {} (ID: {}, dialect: {})",
            connection.name,
            connection.id,
            connection.dialect
        );
        Ok(connection)
    }

    pub async fn list_connections(&self) -> ApiResult<Vec<Connection>> {
        let connections: Vec<Connection> =
            sqlx::query_as("SELECT * FROM connections ORDER BY created_at DESC, id DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(connections)
    }

    pub async fn list_active_connections(&self) -> ApiResult<Vec<Connection>> {
        let connections: Vec<Connection> =
            sqlx::query_as("SELECT * FROM connections WHERE is_active = 1 ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(connections)
    }

    pub async fn get_connection(&self, id: i64) -> ApiResult<Connection> {
        let connection: Option<Connection> =
            sqlx::query_as("SELECT * FROM connections WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        connection.ok_or_else(|| ApiError::not_found("Connection"))
    }

    pub async fn update_connection(
        &self,
        id: i64,
        req: UpdateConnectionRequest,
    ) -> ApiResult<Connection> {
        let current = self.get_connection(id).await?;

        if let Some(name) = &req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ApiError::validation_error("Connection name cannot be empty"));
            }
            if name != current.name {
                let existing: Option<Connection> =
                    sqlx::query_as("SELECT * FROM connections WHERE name = ?")
                        .bind(name)
                        .fetch_optional(&self.pool)
                        .await?;
                if existing.is_some() {
                    return Err(ApiError::conflict("Connection name already exists"));
                }
            }
        }

        let name = req.name.map(|n| n.trim().to_string()).unwrap_or(current.name);
        let dialect = req.dialect.unwrap_or(current.dialect);
        let uri = match req.uri {
            Some(uri) => self.seal_uri(uri.trim())?,
            None => current.uri,
        };
        let is_active = req.is_active.unwrap_or(current.is_active);

        sqlx::query(
            "UPDATE connections SET name = ?, dialect = ?, uri = ?, is_active = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&name)
        .bind(dialect)
        .bind(&uri)
        .bind(is_active)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        // Credentials may have changed; drop any cached warehouse pool.
        self.pool_manager.remove_pool(id);

        self.get_connection(id).await
    }

    pub async fn delete_connection(&self, id: i64) -> ApiResult<()> {
        self.get_connection(id).await?;
        sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.pool_manager.remove_pool(id);
        tracing::info!("Connection {} deleted", id);
        Ok(())
    }

    /// Live connectivity probe against the warehouse.
    pub async fn test_connection(&self, id: i64) -> ApiResult<ConnectionTestResponse> {
        let connection = self.get_connection(id).await?;
        let uri = self.reveal_uri(&connection)?;

        let success = match create_connector(&connection, &uri, Arc::clone(&self.pool_manager)) {
            Ok(connector) => {
                let success = connector.test_connection().await;
                connector.dispose().await;
                success
            },
            Err(e) => {
                tracing::warn!("Connector construction failed for {}: {}", connection.name, e);
                false
            },
        };

        Ok(ConnectionTestResponse { success, connection: connection.name })
    }

    /// Plaintext URI for connector construction.
    pub fn reveal_uri(&self, connection: &Connection) -> ApiResult<String> {
        match &self.secret_box {
            None => Ok(connection.uri.clone()),
            Some(secret_box) => secret_box.decrypt(&connection.uri).map_err(|e| {
                ApiError::configuration_error(format!(
                    "Cannot decrypt connection URI for '{}': {}",
                    connection.name, e
                ))
            }),
        }
    }

    fn seal_uri(&self, uri: &str) -> ApiResult<String> {
        match &self.secret_box {
            None => Ok(uri.to_string()),
            Some(secret_box) => secret_box
                .encrypt(uri)
                .map_err(|e| ApiError::configuration_error(format!("Cannot encrypt URI: {}", e))),
        }
    }
}
