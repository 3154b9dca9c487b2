use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::AppState;
use crate::models::{BlastRadius, FullGraph, LineageNode, TraversalResponse};
use crate::utils::ApiResult;

const DEFAULT_TRAVERSAL_DEPTH: i64 = 3;
const MAX_TRAVERSAL_DEPTH: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct GraphQuery {
    pub connection_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TraversalQuery {
    pub depth: Option<i64>,
    pub min_confidence: Option<f64>,
}

impl TraversalQuery {
    fn depth(&self) -> i64 {
        self.depth.unwrap_or(DEFAULT_TRAVERSAL_DEPTH).clamp(1, MAX_TRAVERSAL_DEPTH)
    }

    fn filter(&self, nodes: Vec<LineageNode>) -> Vec<LineageNode> {
        match self.min_confidence {
            Some(min) if min > 0.0 => {
                nodes.into_iter().filter(|node| node.confidence >= min).collect()
            },
            _ => nodes,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/lineage/graph",
    params(("connection_id" = Option<i64>, Query, description = "Restrict to one connection's tables")),
    responses((status = 200, description = "All live nodes and edges", body = FullGraph)),
    tag = "Lineage"
)]
pub async fn get_full_graph(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GraphQuery>,
) -> ApiResult<Json<FullGraph>> {
    let graph = state.lineage_graph.full_graph(query.connection_id).await?;
    Ok(Json(graph))
}

#[utoipa::path(
    get,
    path = "/api/v1/lineage/{table}/upstream",
    params(
        ("table" = String, Path, description = "Fully qualified table name"),
        ("depth" = Option<i64>, Query, description = "Max hops (default 3, max 10)"),
        ("min_confidence" = Option<f64>, Query, description = "Drop edges below this confidence")
    ),
    responses((status = 200, description = "Tables feeding into this one", body = TraversalResponse)),
    tag = "Lineage"
)]
pub async fn get_upstream(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(query): Query<TraversalQuery>,
) -> ApiResult<Json<TraversalResponse>> {
    let nodes = state.lineage_graph.upstream(&table, query.depth()).await?;
    Ok(Json(TraversalResponse {
        table,
        upstream: Some(query.filter(nodes)),
        downstream: None,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/lineage/{table}/downstream",
    params(
        ("table" = String, Path, description = "Fully qualified table name"),
        ("depth" = Option<i64>, Query, description = "Max hops (default 3, max 10)"),
        ("min_confidence" = Option<f64>, Query, description = "Drop edges below this confidence")
    ),
    responses((status = 200, description = "Tables this one feeds into", body = TraversalResponse)),
    tag = "Lineage"
)]
pub async fn get_downstream(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(query): Query<TraversalQuery>,
) -> ApiResult<Json<TraversalResponse>> {
    let nodes = state.lineage_graph.downstream(&table, query.depth()).await?;
    Ok(Json(TraversalResponse {
        table,
        upstream: None,
        downstream: Some(query.filter(nodes)),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/lineage/{table}/blast-radius",
    params(("table" = String, Path, description = "Fully qualified table name")),
    responses((status = 200, description = "Downstream impact assessment", body = BlastRadius)),
    tag = "Lineage"
)]
pub async fn get_blast_radius(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
) -> ApiResult<Json<BlastRadius>> {
    let blast_radius = state.lineage_graph.blast_radius(&table).await?;
    Ok(Json(blast_radius))
}
