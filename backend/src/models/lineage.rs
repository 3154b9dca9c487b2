use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Days after which an unseen edge stops participating in traversals.
pub const STALE_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LineageEdge {
    pub id: i64,
    pub source_fqn: String,
    pub target_fqn: String,
    pub relationship: String,
    pub query_hash: Option<String>,
    pub confidence: f64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// One node reached by a traversal; `confidence` is the confidence of the
/// edge used on first visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LineageNode {
    pub fqn: String,
    pub depth: i64,
    pub confidence: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TraversalResponse {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Vec<LineageNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream: Option<Vec<LineageNode>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BlastRadius {
    pub table: String,
    pub affected_tables: Vec<LineageNode>,
    pub total_affected: i64,
    pub max_depth: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relationship: String,
    pub confidence: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FullGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}
