use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{
    Connection, CreateTableRequest, MonitoredTable, SchemaSnapshot, UpdateTableRequest,
};
use crate::utils::{ApiError, ApiResult};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Clone)]
pub struct TableService {
    pool: SqlitePool,
}

impl TableService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_table(&self, req: CreateTableRequest) -> ApiResult<MonitoredTable> {
        let schema_name = req.schema_name.trim().to_string();
        let table_name = req.table_name.trim().to_string();
        if schema_name.is_empty() || table_name.is_empty() {
            return Err(ApiError::validation_error("Schema and table name cannot be empty"));
        }

        let connection: Option<Connection> =
            sqlx::query_as("SELECT * FROM connections WHERE id = ?")
                .bind(req.connection_id)
                .fetch_optional(&self.pool)
                .await?;
        if connection.is_none() {
            return Err(ApiError::not_found("Connection"));
        }

        let existing: Option<MonitoredTable> = sqlx::query_as(
            "SELECT * FROM monitored_tables \
             WHERE connection_id = ? AND schema_name = ? AND table_name = ?",
        )
        .bind(req.connection_id)
        .bind(&schema_name)
        .bind(&table_name)
        .fetch_optional(&self.pool)
        .await?;
        if existing.is_some() {
            return Err(ApiError::conflict("Table is already monitored on this connection"));
        }

        let fqn = format!("{}.{}", schema_name, table_name);
        let check_types = serde_json::to_string(&req.check_types)?;
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO monitored_tables \
             (connection_id, schema_name, table_name, fqn, check_types, freshness_sla_minutes, \
              created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(req.connection_id)
        .bind(&schema_name)
        .bind(&table_name)
        .bind(&fqn)
        .bind(&check_types)
        .bind(req.freshness_sla_minutes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let table = self.get_table(result.last_insert_rowid()).await?;
        tracing::info!("Monitoring enrolled for {} (ID: {})", table.fqn, table.id);
        Ok(table)
    }

    pub async fn list_tables(
        &self,
        connection_id: Option<i64>,
        page: i64,
        per_page: i64,
    ) -> ApiResult<Vec<MonitoredTable>> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * per_page;

        let tables: Vec<MonitoredTable> = match connection_id {
            Some(connection_id) => {
                sqlx::query_as(
                    "SELECT * FROM monitored_tables WHERE connection_id = ? \
                     ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                )
                .bind(connection_id)
                .bind(per_page)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            },
            None => {
                sqlx::query_as(
                    "SELECT * FROM monitored_tables \
                     ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                )
                .bind(per_page)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            },
        };
        Ok(tables)
    }

    pub async fn tables_for_connection(&self, connection_id: i64) -> ApiResult<Vec<MonitoredTable>> {
        let tables: Vec<MonitoredTable> =
            sqlx::query_as("SELECT * FROM monitored_tables WHERE connection_id = ? ORDER BY id")
                .bind(connection_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(tables)
    }

    pub async fn get_table(&self, id: i64) -> ApiResult<MonitoredTable> {
        let table: Option<MonitoredTable> =
            sqlx::query_as("SELECT * FROM monitored_tables WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        table.ok_or_else(|| ApiError::not_found("Table"))
    }

    pub async fn update_table(&self, id: i64, req: UpdateTableRequest) -> ApiResult<MonitoredTable> {
        let current = self.get_table(id).await?;

        let check_types = match req.check_types {
            Some(check_types) => serde_json::to_string(&check_types)?,
            None => current.check_types,
        };
        let freshness_sla_minutes = req.freshness_sla_minutes.or(current.freshness_sla_minutes);

        sqlx::query(
            "UPDATE monitored_tables SET check_types = ?, freshness_sla_minutes = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&check_types)
        .bind(freshness_sla_minutes)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_table(id).await
    }

    pub async fn delete_table(&self, id: i64) -> ApiResult<()> {
        self.get_table(id).await?;
        // Snapshots and anomalies cascade with the table row.
        sqlx::query("DELETE FROM monitored_tables WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Monitored table {} deleted", id);
        Ok(())
    }

    /// Schema snapshots for a table, newest first.
    pub async fn list_snapshots(&self, table_id: i64, limit: i64) -> ApiResult<Vec<SchemaSnapshot>> {
        self.get_table(table_id).await?;
        let limit = limit.clamp(1, 100);
        let snapshots: Vec<SchemaSnapshot> = sqlx::query_as(
            "SELECT * FROM schema_snapshots WHERE table_id = ? \
             ORDER BY captured_at DESC, id DESC LIMIT ?",
        )
        .bind(table_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(snapshots)
    }
}
