use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// SQL variant of a warehouse connection. Governs parser behavior and
/// system-schema filtering; the wire protocol is resolved by the connector
/// factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Dialect {
    Mysql,
    Starrocks,
    Doris,
    Postgres,
    Snowflake,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Dialect::Mysql => "mysql",
            Dialect::Starrocks => "starrocks",
            Dialect::Doris => "doris",
            Dialect::Postgres => "postgres",
            Dialect::Snowflake => "snowflake",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Connection {
    pub id: i64,
    pub name: String,
    pub dialect: Dialect,
    /// Sealed when an encryption key is configured; opaque either way.
    pub uri: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateConnectionRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub dialect: Dialect,
    #[validate(length(min = 1))]
    pub uri: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateConnectionRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: Option<String>,
    pub dialect: Option<Dialect>,
    #[validate(length(min = 1))]
    pub uri: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionResponse {
    pub id: i64,
    pub name: String,
    pub dialect: Dialect,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Connection> for ConnectionResponse {
    fn from(conn: Connection) -> Self {
        Self {
            id: conn.id,
            name: conn.name,
            dialect: conn.dialect,
            is_active: conn.is_active,
            created_at: conn.created_at,
            updated_at: conn.updated_at,
        }
    }
}

/// Result of a live connectivity probe.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionTestResponse {
    pub success: bool,
    pub connection: String,
}
