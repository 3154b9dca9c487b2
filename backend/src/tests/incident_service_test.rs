// Incident review API: listing filters and lifecycle transitions

use std::sync::Arc;

use crate::models::{AnomalyKind, IncidentStatus, Severity};
use crate::services::incident_service::{IncidentFilter, IncidentService};
use crate::services::notifier::Notifier;
use crate::tests::common::{
    create_test_connection, create_test_db, create_test_table, insert_test_anomaly,
};
use crate::utils::ApiError;

async fn seed_incident(
    pool: &sqlx::SqlitePool,
    table_id: i64,
    severity: Severity,
) -> i64 {
    let anomaly = insert_test_anomaly(pool, table_id, AnomalyKind::SchemaDrift, severity).await;
    let now = chrono::Utc::now();
    let result = sqlx::query(
        "INSERT INTO incidents (anomaly_id, status, severity, created_at, updated_at) \
         VALUES (?, 'pending_review', ?, ?, ?)",
    )
    .bind(anomaly.id)
    .bind(severity)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
    result.last_insert_rowid()
}

#[tokio::test]
async fn approve_resolves_and_records_the_operator() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;
    let incident_id = seed_incident(&pool, table.id, Severity::High).await;

    let notifier = Arc::new(Notifier::new());
    let mut events = notifier.subscribe();
    let service = IncidentService::new(pool.clone(), notifier);

    let incident = service.approve_incident(incident_id, None).await.unwrap();
    assert_eq!(incident.status, IncidentStatus::Resolved);
    assert_eq!(incident.resolved_by.as_deref(), Some("api_user"));
    assert!(incident.resolved_at.is_some());

    let event: serde_json::Value = serde_json::from_str(&events.recv().await.unwrap()).unwrap();
    assert_eq!(event["event"], "incident.updated");
    assert_eq!(event["data"]["status"], "resolved");
}

#[tokio::test]
async fn dismiss_records_the_reason() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;
    let incident_id = seed_incident(&pool, table.id, Severity::Low).await;

    let service = IncidentService::new(pool.clone(), Arc::new(Notifier::new()));
    let incident = service
        .dismiss_incident(incident_id, "expected maintenance".to_string())
        .await
        .unwrap();

    assert_eq!(incident.status, IncidentStatus::Dismissed);
    assert_eq!(incident.dismiss_reason.as_deref(), Some("expected maintenance"));
}

#[tokio::test]
async fn closed_incidents_cannot_transition_again() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;
    let incident_id = seed_incident(&pool, table.id, Severity::High).await;

    let service = IncidentService::new(pool.clone(), Arc::new(Notifier::new()));
    service.approve_incident(incident_id, None).await.unwrap();

    let again = service.approve_incident(incident_id, None).await;
    assert!(matches!(again, Err(ApiError::Conflict(_))));

    let dismissed = service.dismiss_incident(incident_id, "too late".to_string()).await;
    assert!(matches!(dismissed, Err(ApiError::Conflict(_))));
}

#[tokio::test]
async fn unknown_incident_is_not_found() {
    let pool = create_test_db().await;
    let service = IncidentService::new(pool.clone(), Arc::new(Notifier::new()));

    assert!(matches!(service.get_incident(999).await, Err(ApiError::NotFound(_))));
    assert!(matches!(service.approve_incident(999, None).await, Err(ApiError::NotFound(_))));
    assert!(matches!(service.get_report(999).await, Err(ApiError::NotFound(_))));
}

#[tokio::test]
async fn list_filters_by_status_and_severity() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;

    let a = seed_incident(&pool, table.id, Severity::Critical).await;
    let _b = seed_incident(&pool, table.id, Severity::Low).await;

    let service = IncidentService::new(pool.clone(), Arc::new(Notifier::new()));
    service.approve_incident(a, None).await.unwrap();

    let resolved = service
        .list_incidents(IncidentFilter {
            status: Some(IncidentStatus::Resolved),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].id, a);

    let critical = service
        .list_incidents(IncidentFilter { severity: Some(Severity::Critical), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(critical.len(), 1);

    let by_table = service
        .list_incidents(IncidentFilter { table_id: Some(table.id), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(by_table.len(), 2);

    let none = service
        .list_incidents(IncidentFilter { table_id: Some(table.id + 1), ..Default::default() })
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn report_is_absent_until_generated() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    let table = create_test_table(&pool, connection.id, "analytics", "orders", None).await;
    let incident_id = seed_incident(&pool, table.id, Severity::High).await;

    let service = IncidentService::new(pool.clone(), Arc::new(Notifier::new()));
    assert!(service.get_report(incident_id).await.unwrap().is_none());

    sqlx::query("UPDATE incidents SET report = '{\"incident_id\": 1}' WHERE id = ?")
        .bind(incident_id)
        .execute(&pool)
        .await
        .unwrap();
    assert!(service.get_report(incident_id).await.unwrap().is_some());
}
