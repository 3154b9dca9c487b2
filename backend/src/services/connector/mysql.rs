//! MySQL-protocol warehouse driver (MySQL, StarRocks, Doris).
//!
//! All metadata comes from `information_schema`; the query log comes from the
//! per-engine audit table when one exists.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use mysql_async::prelude::Queryable;
use mysql_async::{Pool, Row, Value};
use std::sync::Arc;

use super::{ConnectorPoolManager, QueryLogEntry, WarehouseConnector};
use crate::models::{ColumnInfo, Dialect, TableInfo};
use crate::utils::{ApiError, ApiResult};

pub struct MySqlConnector {
    connection_id: i64,
    dialect: Dialect,
    pool: Pool,
}

impl MySqlConnector {
    pub fn new(
        connection_id: i64,
        dialect: Dialect,
        uri: &str,
        pool_manager: Arc<ConnectorPoolManager>,
    ) -> ApiResult<Self> {
        let pool = pool_manager.get_pool(connection_id, uri)?;
        Ok(Self { connection_id, dialect, pool })
    }

    async fn conn(&self) -> ApiResult<mysql_async::Conn> {
        self.pool.get_conn().await.map_err(|e| {
            ApiError::warehouse_connection_failed(format!(
                "Failed to get connection for connection {}: {}",
                self.connection_id, e
            ))
        })
    }

    /// Schemas that belong to the engine rather than the user.
    fn system_schemas(&self) -> &'static [&'static str] {
        match self.dialect {
            Dialect::Starrocks => {
                &["information_schema", "mysql", "performance_schema", "sys", "_statistics_"]
            },
            Dialect::Doris => {
                &["information_schema", "mysql", "performance_schema", "sys", "__internal_schema"]
            },
            _ => &["information_schema", "mysql", "performance_schema", "sys"],
        }
    }

    /// Audit-log location: (schema, table, time column, statement column).
    fn audit_log_location(&self) -> Option<(&'static str, &'static str, &'static str, &'static str)> {
        match self.dialect {
            Dialect::Starrocks => {
                Some(("starrocks_audit_db__", "starrocks_audit_tbl__", "timestamp", "stmt"))
            },
            Dialect::Doris => Some(("__internal_schema", "audit_log", "time", "stmt")),
            _ => None,
        }
    }
}

#[async_trait]
impl WarehouseConnector for MySqlConnector {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn list_schemas(&self) -> ApiResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let rows: Vec<Row> = conn
            .query("SELECT schema_name FROM information_schema.schemata ORDER BY schema_name")
            .await
            .map_err(|e| ApiError::warehouse_connection_failed(e.to_string()))?;
        drop(conn);

        let system = self.system_schemas();
        Ok(rows
            .iter()
            .map(|row| value_to_string(&row[0]))
            .filter(|schema| !system.contains(&schema.as_str()))
            .collect())
    }

    async fn list_tables(&self, schema: &str) -> ApiResult<Vec<TableInfo>> {
        let mut conn = self.conn().await?;
        let rows: Vec<Row> = conn
            .exec(
                "SELECT table_name, table_type FROM information_schema.tables \
                 WHERE table_schema = ? ORDER BY table_name",
                (schema,),
            )
            .await
            .map_err(|e| ApiError::warehouse_connection_failed(e.to_string()))?;
        drop(conn);

        Ok(rows
            .iter()
            .map(|row| TableInfo {
                name: value_to_string(&row[0]),
                table_type: value_to_string(&row[1]),
                schema: schema.to_string(),
            })
            .collect())
    }

    async fn fetch_schema(&self, schema: &str, table: &str) -> ApiResult<Vec<ColumnInfo>> {
        let mut conn = self.conn().await?;
        let rows: Vec<Row> = conn
            .exec(
                "SELECT column_name, data_type, is_nullable, ordinal_position \
                 FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? \
                 ORDER BY ordinal_position",
                (schema, table),
            )
            .await
            .map_err(|e| ApiError::warehouse_connection_failed(e.to_string()))?;
        drop(conn);

        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: value_to_string(&row[0]),
                data_type: value_to_string(&row[1]).to_uppercase(),
                nullable: value_to_string(&row[2]).eq_ignore_ascii_case("yes"),
                ordinal: value_to_i64(&row[3]).unwrap_or(0),
            })
            .collect())
    }

    async fn fetch_last_update_time(
        &self,
        schema: &str,
        table: &str,
    ) -> ApiResult<Option<DateTime<Utc>>> {
        let mut conn = self.conn().await?;
        let row: Option<Row> = conn
            .exec_first(
                "SELECT update_time FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name = ?",
                (schema, table),
            )
            .await
            .map_err(|e| ApiError::warehouse_connection_failed(e.to_string()))?;
        drop(conn);

        Ok(row.and_then(|row| value_to_datetime(&row[0])))
    }

    async fn test_connection(&self) -> bool {
        match self.conn().await {
            Ok(mut conn) => conn.query::<Row, _>("SELECT 1").await.is_ok(),
            Err(_) => false,
        }
    }

    async fn fetch_query_log(
        &self,
        since: DateTime<Utc>,
    ) -> ApiResult<Option<Vec<QueryLogEntry>>> {
        let Some((db, table, time_col, stmt_col)) = self.audit_log_location() else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT `{time_col}`, `{stmt_col}` FROM `{db}`.`{table}` WHERE `{time_col}` >= ?",
        );

        let mut conn = self.conn().await?;
        let rows: Vec<Row> = conn
            .exec(sql.as_str(), (since.format("%Y-%m-%d %H:%M:%S").to_string(),))
            .await
            .map_err(|e| ApiError::warehouse_connection_failed(e.to_string()))?;
        drop(conn);

        let entries = rows
            .iter()
            .map(|row| QueryLogEntry {
                executed_at: value_to_datetime(&row[0]),
                sql: value_to_string(&row[1]),
            })
            .filter(|entry| !entry.sql.is_empty())
            .collect();

        Ok(Some(entries))
    }

    async fn dispose(&self) {
        // The pool outlives the connector; dropping our clone releases the
        // cycle's handle without tearing down sockets shared with others.
    }
}

// ============================================================================
// Value conversion helpers
// ============================================================================

fn value_to_string(value: &Value) -> String {
    match value {
        Value::NULL => String::new(),
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Date(year, month, day, hour, minute, second, _) => {
            format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", year, month, day, hour, minute, second)
        },
        Value::Time(neg, days, hours, minutes, seconds, _) => {
            let sign = if *neg { "-" } else { "" };
            format!("{}{:02}:{:02}:{:02}", sign, u32::from(*days) * 24 + u32::from(*hours), minutes, seconds)
        },
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(*v),
        Value::UInt(v) => i64::try_from(*v).ok(),
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).parse().ok(),
        _ => None,
    }
}

/// Warehouse timestamps are wall-clock values without a zone; treat them as UTC.
fn value_to_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Date(year, month, day, hour, minute, second, micro) => {
            let date = NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))?;
            let naive = date.and_hms_micro_opt(
                u32::from(*hour),
                u32::from(*minute),
                u32::from(*second),
                *micro,
            )?;
            Some(Utc.from_utc_datetime(&naive))
        },
        Value::Bytes(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            parse_datetime_text(text.trim())
        },
        _ => None,
    }
}

fn parse_datetime_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_date_values() {
        let value = Value::Date(2026, 8, 1, 10, 30, 0, 0);
        let parsed = value_to_datetime(&value).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-08-01T10:30:00+00:00");
    }

    #[test]
    fn converts_text_timestamps() {
        let value = Value::Bytes(b"2026-08-01 10:30:00".to_vec());
        assert!(value_to_datetime(&value).is_some());

        let value = Value::Bytes(b"not a timestamp".to_vec());
        assert!(value_to_datetime(&value).is_none());
    }

    #[test]
    fn stringifies_common_values() {
        assert_eq!(value_to_string(&Value::NULL), "");
        assert_eq!(value_to_string(&Value::Int(42)), "42");
        assert_eq!(value_to_string(&Value::Bytes(b"orders".to_vec())), "orders");
    }
}
