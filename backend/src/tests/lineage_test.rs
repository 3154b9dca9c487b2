// Lineage graph traversals and edge upsert semantics

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::models::LineageEdge;
use crate::services::lineage::{LineageGraph, LineageRefresher};
use crate::tests::common::create_test_db;

async fn seed_edge(pool: &SqlitePool, source: &str, target: &str, confidence: f64) {
    LineageRefresher::new(pool.clone())
        .upsert_edge(source, target, confidence, "seed", Utc::now())
        .await
        .unwrap();
}

/// raw.orders -> staging.orders -> analytics.orders -> {daily_revenue, customer_ltv}
async fn seed_chain(pool: &SqlitePool) {
    seed_edge(pool, "raw.orders", "staging.orders", 1.0).await;
    seed_edge(pool, "staging.orders", "analytics.orders", 1.0).await;
    seed_edge(pool, "analytics.orders", "analytics.daily_revenue", 0.8).await;
    seed_edge(pool, "analytics.orders", "analytics.customer_ltv", 1.0).await;
}

#[tokio::test]
async fn downstream_respects_depth_bound() {
    let pool = create_test_db().await;
    seed_chain(&pool).await;
    let graph = LineageGraph::new(pool.clone());

    let one_hop = graph.downstream("raw.orders", 1).await.unwrap();
    assert_eq!(one_hop.len(), 1);
    assert_eq!(one_hop[0].fqn, "staging.orders");
    assert_eq!(one_hop[0].depth, 1);

    let all = graph.downstream("raw.orders", 10).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|node| node.depth <= 4));
}

#[tokio::test]
async fn traversal_visits_each_node_once() {
    let pool = create_test_db().await;
    // Diamond: a -> b, a -> c, b -> d, c -> d
    seed_edge(&pool, "a", "b", 1.0).await;
    seed_edge(&pool, "a", "c", 0.8).await;
    seed_edge(&pool, "b", "d", 1.0).await;
    seed_edge(&pool, "c", "d", 1.0).await;

    let graph = LineageGraph::new(pool.clone());
    let nodes = graph.downstream("a", 10).await.unwrap();

    let mut fqns: Vec<&str> = nodes.iter().map(|n| n.fqn.as_str()).collect();
    fqns.sort();
    assert_eq!(fqns, vec!["b", "c", "d"]);
}

#[tokio::test]
async fn upstream_is_symmetric() {
    let pool = create_test_db().await;
    seed_chain(&pool).await;
    let graph = LineageGraph::new(pool.clone());

    let upstream = graph.upstream("analytics.orders", 10).await.unwrap();
    let fqns: Vec<&str> = upstream.iter().map(|n| n.fqn.as_str()).collect();
    assert_eq!(fqns, vec!["staging.orders", "raw.orders"]);
}

#[tokio::test]
async fn blast_radius_counts_all_reachable_downstream() {
    let pool = create_test_db().await;
    seed_chain(&pool).await;
    let graph = LineageGraph::new(pool.clone());

    let blast = graph.blast_radius("staging.orders").await.unwrap();
    assert!(blast.total_affected >= 3);
    assert!(blast.max_depth >= 2);
    assert_eq!(blast.table, "staging.orders");
}

#[tokio::test]
async fn path_finds_shortest_route() {
    let pool = create_test_db().await;
    seed_chain(&pool).await;
    let graph = LineageGraph::new(pool.clone());

    let path = graph.path("raw.orders", "analytics.daily_revenue").await.unwrap().unwrap();
    assert_eq!(
        path,
        vec!["raw.orders", "staging.orders", "analytics.orders", "analytics.daily_revenue"]
    );

    assert!(graph.path("analytics.daily_revenue", "raw.orders").await.unwrap().is_none());
}

#[tokio::test]
async fn stale_edges_are_excluded_from_traversals() {
    let pool = create_test_db().await;
    seed_edge(&pool, "raw.orders", "staging.orders", 1.0).await;

    // Age the edge past the staleness window.
    sqlx::query("UPDATE lineage_edges SET last_seen_at = ?")
        .bind(Utc::now() - Duration::days(45))
        .execute(&pool)
        .await
        .unwrap();

    let graph = LineageGraph::new(pool.clone());
    assert!(graph.downstream("raw.orders", 10).await.unwrap().is_empty());
    assert!(graph.full_graph(None).await.unwrap().nodes.is_empty());

    // The row itself is retained.
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM lineage_edges").fetch_one(&pool).await.unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn upsert_ratchets_confidence_and_last_seen() {
    let pool = create_test_db().await;
    let refresher = LineageRefresher::new(pool.clone());

    let earlier = Utc::now() - Duration::hours(1);
    refresher.upsert_edge("s", "t", 0.8, "INSERT INTO t SELECT 1", earlier).await.unwrap();

    let first: LineageEdge =
        sqlx::query_as("SELECT * FROM lineage_edges WHERE source_fqn = 's'")
            .fetch_one(&pool)
            .await
            .unwrap();

    let now = Utc::now();
    refresher.upsert_edge("s", "t", 0.6, "INSERT INTO t SELECT 2", now).await.unwrap();

    let second: LineageEdge =
        sqlx::query_as("SELECT * FROM lineage_edges WHERE source_fqn = 's'")
            .fetch_one(&pool)
            .await
            .unwrap();

    // Still one row; confidence kept at the max; last_seen_at advanced;
    // query hash tracks the newest statement.
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM lineage_edges").fetch_one(&pool).await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(second.confidence, 0.8);
    assert!(second.last_seen_at > first.last_seen_at);
    assert_ne!(second.query_hash, first.query_hash);
    assert_eq!(second.first_seen_at, first.first_seen_at);
}

#[tokio::test]
async fn full_graph_sorts_nodes_and_keeps_edges() {
    let pool = create_test_db().await;
    seed_chain(&pool).await;
    let graph = LineageGraph::new(pool.clone());

    let full = graph.full_graph(None).await.unwrap();
    assert_eq!(full.edges.len(), 4);

    let ids: Vec<&str> = full.nodes.iter().map(|n| n.id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn refresher_ingests_query_logs_through_the_connector() {
    use crate::tests::common::FakeConnector;

    let pool = create_test_db().await;
    let connector = FakeConnector {
        query_log: vec![
            "INSERT INTO analytics.combined SELECT o.id, c.name \
             FROM orders o JOIN customers c ON o.cust_id = c.id"
                .to_string(),
            "SELECT * FROM analytics.combined".to_string(),
            "not even sql".to_string(),
        ],
        ..Default::default()
    };

    let refresher = LineageRefresher::new(pool.clone());
    let upserts = refresher.refresh(&connector, None).await;
    assert_eq!(upserts, 2);

    let edges: Vec<LineageEdge> =
        sqlx::query_as("SELECT * FROM lineage_edges ORDER BY id").fetch_all(&pool).await.unwrap();
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|edge| edge.target_fqn == "analytics.combined"));
    assert!(edges.iter().all(|edge| edge.confidence == 1.0));
}
