// Orchestrator state machine tests: dedupe, escalation, lifecycle

use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::models::{AnomalyKind, Incident, IncidentStatus, Severity};
use crate::services::architect::Architect;
use crate::services::lineage::LineageGraph;
use crate::services::notifier::Notifier;
use crate::services::orchestrator::Orchestrator;
use crate::tests::common::{
    FakeLlm, create_test_connection, create_test_db, create_test_table, insert_test_anomaly,
};

fn build_orchestrator(pool: &SqlitePool, llm: FakeLlm, notifier: Arc<Notifier>) -> Orchestrator {
    let architect =
        Architect::new(pool.clone(), LineageGraph::new(pool.clone()), Arc::new(llm));
    Orchestrator::new(pool.clone(), architect, notifier)
}

async fn open_incident_count(pool: &SqlitePool) -> i64 {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM incidents \
         WHERE status IN ('open', 'investigating', 'pending_review')",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    count
}

#[tokio::test]
async fn create_path_runs_the_full_pipeline() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;
    let anomaly =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::Medium).await;

    let notifier = Arc::new(Notifier::new());
    let orchestrator = build_orchestrator(&pool, FakeLlm::unavailable(), Arc::clone(&notifier));

    let incident = orchestrator.handle_anomaly(&anomaly).await.unwrap();

    assert_eq!(incident.status, IncidentStatus::PendingReview);
    assert_eq!(incident.severity, Severity::Medium);
    // Fallback diagnosis, remediation, and report are all persisted.
    assert!(incident.diagnosis.is_some());
    assert!(incident.remediation.is_some());
    assert!(incident.report.is_some());
    assert!(incident.blast_radius.is_some());
}

#[tokio::test]
async fn repeat_anomalies_merge_into_one_incident() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;

    let notifier = Arc::new(Notifier::new());
    let mut events = notifier.subscribe();
    let orchestrator = build_orchestrator(&pool, FakeLlm::unavailable(), Arc::clone(&notifier));

    let first =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::Medium).await;
    let second =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::Critical).await;

    let incident_a = orchestrator.handle_anomaly(&first).await.unwrap();
    let incident_b = orchestrator.handle_anomaly(&second).await.unwrap();

    assert_eq!(incident_a.id, incident_b.id);
    assert_eq!(incident_b.severity, Severity::Critical);
    assert_eq!(open_incident_count(&pool).await, 1);

    // One incident.created followed by one incident.updated.
    let created: serde_json::Value =
        serde_json::from_str(&events.recv().await.unwrap()).unwrap();
    assert_eq!(created["event"], "incident.created");
    let updated: serde_json::Value =
        serde_json::from_str(&events.recv().await.unwrap()).unwrap();
    assert_eq!(updated["event"], "incident.updated");
    assert_eq!(updated["data"]["severity"], "critical");
}

#[tokio::test]
async fn merge_never_downgrades_severity() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;

    let notifier = Arc::new(Notifier::new());
    let orchestrator = build_orchestrator(&pool, FakeLlm::unavailable(), notifier);

    let first =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::Critical).await;
    let second =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::Low).await;

    orchestrator.handle_anomaly(&first).await.unwrap();
    let incident = orchestrator.handle_anomaly(&second).await.unwrap();
    assert_eq!(incident.severity, Severity::Critical);
}

#[tokio::test]
async fn different_anomaly_kinds_open_distinct_incidents() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;

    let notifier = Arc::new(Notifier::new());
    let orchestrator = build_orchestrator(&pool, FakeLlm::unavailable(), notifier);

    let drift =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::Medium).await;
    let freshness =
        insert_test_anomaly(&pool, table.id, AnomalyKind::FreshnessViolation, Severity::Medium)
            .await;

    let incident_a = orchestrator.handle_anomaly(&drift).await.unwrap();
    let incident_b = orchestrator.handle_anomaly(&freshness).await.unwrap();

    assert_ne!(incident_a.id, incident_b.id);
    assert_eq!(open_incident_count(&pool).await, 2);
}

#[tokio::test]
async fn resolved_incidents_do_not_absorb_new_anomalies() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;

    let notifier = Arc::new(Notifier::new());
    let orchestrator = build_orchestrator(&pool, FakeLlm::unavailable(), notifier);

    let first =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::Medium).await;
    let incident = orchestrator.handle_anomaly(&first).await.unwrap();

    sqlx::query("UPDATE incidents SET status = 'resolved' WHERE id = ?")
        .bind(incident.id)
        .execute(&pool)
        .await
        .unwrap();

    let second =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::Medium).await;
    let new_incident = orchestrator.handle_anomaly(&second).await.unwrap();

    assert_ne!(incident.id, new_incident.id);
    assert_eq!(open_incident_count(&pool).await, 1);
}

#[tokio::test]
async fn llm_diagnosis_is_adopted_but_clamped() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;

    // LLM claims "low" for a critical anomaly; the incident must not downgrade.
    let payload = json!({
        "root_cause": "Upstream loader changed a column type",
        "root_cause_table": "raw.orders",
        "blast_radius": ["analytics.orders", "analytics.daily_revenue"],
        "severity": "low",
        "confidence": 0.9,
        "recommendations": [
            {"action": "revert", "description": "Revert the type change",
             "sql": "ALTER TABLE raw.orders MODIFY price FLOAT", "priority": 1}
        ]
    });

    let notifier = Arc::new(Notifier::new());
    let orchestrator = build_orchestrator(&pool, FakeLlm::returning(payload), notifier);

    let anomaly =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::Critical).await;
    let incident = orchestrator.handle_anomaly(&anomaly).await.unwrap();

    assert_eq!(incident.severity, Severity::Critical);

    let diagnosis: serde_json::Value =
        serde_json::from_str(incident.diagnosis.as_deref().unwrap()).unwrap();
    assert_eq!(diagnosis["root_cause_table"], "raw.orders");
    assert_eq!(diagnosis["confidence"], 0.9);

    let blast: Vec<String> =
        serde_json::from_str(incident.blast_radius.as_deref().unwrap()).unwrap();
    assert_eq!(blast.len(), 2);

    // SQL-bearing recommendation becomes a pending-approval action.
    let remediation: serde_json::Value =
        serde_json::from_str(incident.remediation.as_deref().unwrap()).unwrap();
    assert_eq!(remediation["actions"][0]["status"], "pending_approval");
}

#[tokio::test]
async fn llm_escalation_is_adopted() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;

    let payload = json!({
        "root_cause": "Export job stalled",
        "root_cause_table": "raw.orders",
        "severity": "critical",
        "confidence": 0.8
    });

    let notifier = Arc::new(Notifier::new());
    let orchestrator = build_orchestrator(&pool, FakeLlm::returning(payload), notifier);

    let anomaly =
        insert_test_anomaly(&pool, table.id, AnomalyKind::FreshnessViolation, Severity::Medium)
            .await;
    let incident = orchestrator.handle_anomaly(&anomaly).await.unwrap();
    assert_eq!(incident.severity, Severity::Critical);
}

#[tokio::test]
async fn incidents_returned_by_merge_are_persisted_rows() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;

    let notifier = Arc::new(Notifier::new());
    let orchestrator = build_orchestrator(&pool, FakeLlm::unavailable(), notifier);

    let first =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::Low).await;
    let second =
        insert_test_anomaly(&pool, table.id, AnomalyKind::SchemaDrift, Severity::High).await;

    orchestrator.handle_anomaly(&first).await.unwrap();
    let merged = orchestrator.handle_anomaly(&second).await.unwrap();

    let stored: Incident = sqlx::query_as("SELECT * FROM incidents WHERE id = ?")
        .bind(merged.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored.severity, Severity::High);
    assert!(stored.updated_at >= stored.created_at);
}
