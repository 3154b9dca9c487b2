//! DAG traversals over `lineage_edges` for blast-radius and path queries.
//!
//! The store is the graph: every hop re-queries the edge relation with the
//! recency cutoff applied, so traversals always see the current window.
//! Neighbors are read in insertion order, which keeps results deterministic
//! for a fixed database state.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::models::{
    BlastRadius, FullGraph, GraphEdge, GraphNode, LineageEdge, LineageNode, STALE_DAYS,
};
use crate::utils::ApiResult;

const BLAST_RADIUS_DEPTH: i64 = 10;

#[derive(Clone, Copy, PartialEq)]
enum Direction {
    Upstream,
    Downstream,
}

#[derive(Clone)]
pub struct LineageGraph {
    pool: SqlitePool,
}

impl LineageGraph {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn cutoff() -> DateTime<Utc> {
        Utc::now() - Duration::days(STALE_DAYS)
    }

    /// What feeds INTO this table, up to `depth` hops.
    pub async fn upstream(&self, table: &str, depth: i64) -> ApiResult<Vec<LineageNode>> {
        self.bfs(table, depth, Direction::Upstream).await
    }

    /// What this table feeds INTO, up to `depth` hops.
    pub async fn downstream(&self, table: &str, depth: i64) -> ApiResult<Vec<LineageNode>> {
        self.bfs(table, depth, Direction::Downstream).await
    }

    /// Full downstream impact assessment.
    pub async fn blast_radius(&self, table: &str) -> ApiResult<BlastRadius> {
        let affected = self.downstream(table, BLAST_RADIUS_DEPTH).await?;
        let max_depth = affected.iter().map(|node| node.depth).max().unwrap_or(0);
        Ok(BlastRadius {
            table: table.to_string(),
            total_affected: affected.len() as i64,
            affected_tables: affected,
            max_depth,
        })
    }

    /// Shortest forward path between two tables, or `None` when unreachable.
    pub async fn path(&self, source: &str, target: &str) -> ApiResult<Option<Vec<String>>> {
        let cutoff = Self::cutoff();
        let mut visited: HashSet<String> = HashSet::from([source.to_string()]);
        let mut parents: HashMap<String, String> = HashMap::new();
        let mut queue: VecDeque<String> = VecDeque::from([source.to_string()]);

        while let Some(current) = queue.pop_front() {
            let neighbors: Vec<(String,)> = sqlx::query_as(
                "SELECT target_fqn FROM lineage_edges \
                 WHERE source_fqn = ? AND last_seen_at >= ? ORDER BY id",
            )
            .bind(&current)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

            for (neighbor,) in neighbors {
                if neighbor == target {
                    let mut path = vec![neighbor];
                    let mut cursor = current.clone();
                    while cursor != source {
                        path.push(cursor.clone());
                        cursor = parents[&cursor].clone();
                    }
                    path.push(source.to_string());
                    path.reverse();
                    return Ok(Some(path));
                }
                if visited.insert(neighbor.clone()) {
                    parents.insert(neighbor.clone(), current.clone());
                    queue.push_back(neighbor);
                }
            }
        }

        Ok(None)
    }

    /// All live nodes and edges, optionally restricted to tables enrolled
    /// under one connection.
    pub async fn full_graph(&self, connection_id: Option<i64>) -> ApiResult<FullGraph> {
        let cutoff = Self::cutoff();
        let edges: Vec<LineageEdge> =
            sqlx::query_as("SELECT * FROM lineage_edges WHERE last_seen_at >= ? ORDER BY id")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?;

        let scope: Option<HashSet<String>> = match connection_id {
            Some(connection_id) => {
                let fqns: Vec<(String,)> =
                    sqlx::query_as("SELECT fqn FROM monitored_tables WHERE connection_id = ?")
                        .bind(connection_id)
                        .fetch_all(&self.pool)
                        .await?;
                Some(fqns.into_iter().map(|(fqn,)| fqn).collect())
            },
            None => None,
        };

        let mut nodes: HashSet<String> = HashSet::new();
        let mut edge_list = Vec::new();

        for edge in edges {
            if let Some(scope) = &scope {
                if !scope.contains(&edge.source_fqn) && !scope.contains(&edge.target_fqn) {
                    continue;
                }
            }
            nodes.insert(edge.source_fqn.clone());
            nodes.insert(edge.target_fqn.clone());
            edge_list.push(GraphEdge {
                source: edge.source_fqn,
                target: edge.target_fqn,
                relationship: edge.relationship,
                confidence: edge.confidence,
            });
        }

        let mut sorted_nodes: Vec<String> = nodes.into_iter().collect();
        sorted_nodes.sort();

        Ok(FullGraph {
            nodes: sorted_nodes
                .into_iter()
                .map(|fqn| GraphNode { id: fqn.clone(), label: fqn })
                .collect(),
            edges: edge_list,
        })
    }

    /// Generic BFS. Each node is visited at most once; the confidence carried
    /// is that of the edge used on first visit, and edges at the depth bound
    /// are not traversed.
    async fn bfs(
        &self,
        start: &str,
        depth: i64,
        direction: Direction,
    ) -> ApiResult<Vec<LineageNode>> {
        let cutoff = Self::cutoff();
        let mut results = Vec::new();
        let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
        let mut queue: VecDeque<(String, i64)> = VecDeque::from([(start.to_string(), 0)]);

        let sql = match direction {
            Direction::Downstream => {
                "SELECT * FROM lineage_edges \
                 WHERE source_fqn = ? AND last_seen_at >= ? ORDER BY id"
            },
            Direction::Upstream => {
                "SELECT * FROM lineage_edges \
                 WHERE target_fqn = ? AND last_seen_at >= ? ORDER BY id"
            },
        };

        while let Some((current, current_depth)) = queue.pop_front() {
            if current_depth >= depth {
                continue;
            }

            let edges: Vec<LineageEdge> = sqlx::query_as(sql)
                .bind(&current)
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?;

            for edge in edges {
                let neighbor = match direction {
                    Direction::Downstream => edge.target_fqn,
                    Direction::Upstream => edge.source_fqn,
                };
                if visited.insert(neighbor.clone()) {
                    results.push(LineageNode {
                        fqn: neighbor.clone(),
                        depth: current_depth + 1,
                        confidence: edge.confidence,
                    });
                    queue.push_back((neighbor, current_depth + 1));
                }
            }
        }

        Ok(results)
    }
}
