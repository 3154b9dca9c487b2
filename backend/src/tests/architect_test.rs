// Architect: LLM primary path and rule-based fallback

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::models::{AnomalyKind, Severity};
use crate::services::architect::Architect;
use crate::services::lineage::{LineageGraph, LineageRefresher};
use crate::tests::common::{
    FakeLlm, create_test_connection, create_test_db, create_test_table, insert_test_anomaly,
};

#[tokio::test]
async fn llm_payload_becomes_the_diagnosis() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;
    let anomaly =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::High).await;

    let llm = FakeLlm::returning(json!({
        "root_cause": "Upstream migration dropped a column",
        "root_cause_table": "raw.orders",
        "blast_radius": ["analytics.orders"],
        "severity": "high",
        "confidence": 0.85,
        "recommendations": [
            {"action": "revert", "description": "Restore the column", "priority": 1}
        ]
    }));
    let architect = Architect::new(pool.clone(), LineageGraph::new(pool.clone()), Arc::new(llm));

    let diagnosis = architect.analyze(&anomaly).await.unwrap();
    assert_eq!(diagnosis.root_cause, "Upstream migration dropped a column");
    assert_eq!(diagnosis.root_cause_table, "raw.orders");
    assert_eq!(diagnosis.severity, Severity::High);
    assert_eq!(diagnosis.confidence, 0.85);
    assert_eq!(diagnosis.recommendations.len(), 1);
}

#[tokio::test]
async fn invalid_llm_payload_falls_back_to_rules() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;
    let anomaly =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::High).await;

    // Parseable JSON but missing the required fields.
    let llm = FakeLlm::returning(json!({"verdict": "looks bad"}));
    let architect = Architect::new(pool.clone(), LineageGraph::new(pool.clone()), Arc::new(llm));

    let diagnosis = architect.analyze(&anomaly).await.unwrap();
    assert_eq!(diagnosis.confidence, 0.0);
    assert_eq!(diagnosis.severity, Severity::High);
    assert_eq!(diagnosis.root_cause_table, "analytics.orders");
}

#[tokio::test]
async fn fallback_includes_downstream_blast_radius() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;
    let anomaly =
        insert_test_anomaly(&pool, table.id, AnomalyKind::FreshnessViolation, Severity::Medium)
            .await;

    let refresher = LineageRefresher::new(pool.clone());
    refresher
        .upsert_edge("analytics.orders", "analytics.daily_revenue", 1.0, "seed", Utc::now())
        .await
        .unwrap();
    refresher
        .upsert_edge("analytics.orders", "analytics.customer_ltv", 1.0, "seed", Utc::now())
        .await
        .unwrap();

    let architect = Architect::new(
        pool.clone(),
        LineageGraph::new(pool.clone()),
        Arc::new(FakeLlm::unavailable()),
    );

    let diagnosis = architect.analyze(&anomaly).await.unwrap();
    assert_eq!(diagnosis.confidence, 0.0);
    assert_eq!(diagnosis.blast_radius.len(), 2);
    assert_eq!(diagnosis.recommendations.len(), 1);
    assert_eq!(diagnosis.recommendations[0].action, "investigate");
    assert_eq!(diagnosis.recommendations[0].priority, 1);
}

#[tokio::test]
async fn fallback_keeps_the_anomaly_severity() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;

    for severity in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
        let anomaly =
            insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, severity).await;
        let architect = Architect::new(
            pool.clone(),
            LineageGraph::new(pool.clone()),
            Arc::new(FakeLlm::unavailable()),
        );
        let diagnosis = architect.analyze(&anomaly).await.unwrap();
        assert_eq!(diagnosis.severity, severity);
    }
}
