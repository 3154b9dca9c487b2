// Discovery and rediscovery against a fake warehouse catalog

use crate::models::{DeltaAction, TableRole};
use crate::services::discovery::DiscoveryService;
use crate::tests::common::{
    FakeConnector, column, create_test_connection, create_test_db, create_test_table,
};

#[tokio::test]
async fn discovery_classifies_catalog_tables() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;

    let connector = FakeConnector {
        schemas: vec!["analytics".to_string(), "staging".to_string()],
        tables: vec![
            ("analytics".to_string(), "fct_sales".to_string()),
            ("analytics".to_string(), "_tmp_scratch".to_string()),
            ("staging".to_string(), "orders".to_string()),
        ],
        columns: std::sync::Mutex::new(vec![column("updated_at", "DATETIME", true, 1)]),
        ..Default::default()
    };

    let report = DiscoveryService::new(pool.clone())
        .discover(&connection, &connector)
        .await
        .unwrap();

    assert_eq!(report.connection_id, connection.id);
    assert_eq!(report.total_tables, 3);
    assert_eq!(report.schemas_found, vec!["analytics", "staging"]);

    let fact = report.proposals.iter().find(|p| p.table_name == "fct_sales").unwrap();
    assert_eq!(fact.role, TableRole::Fact);
    assert_eq!(fact.suggested_sla_minutes, Some(360));
    assert!(!fact.skip);

    let tmp = report.proposals.iter().find(|p| p.table_name == "_tmp_scratch").unwrap();
    assert_eq!(tmp.role, TableRole::System);
    assert!(tmp.skip);

    let staging = report.proposals.iter().find(|p| p.table_name == "orders").unwrap();
    assert_eq!(staging.role, TableRole::Staging);
}

#[tokio::test]
async fn rediscovery_reports_new_and_dropped_tables() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;

    // Enrolled: analytics.orders (still live), analytics.retired (gone).
    create_test_table(&pool, connection.id, "analytics", "orders", None).await;
    create_test_table(&pool, connection.id, "analytics", "retired", None).await;

    let connector = FakeConnector {
        schemas: vec!["analytics".to_string()],
        tables: vec![
            ("analytics".to_string(), "orders".to_string()),
            ("analytics".to_string(), "brand_new".to_string()),
        ],
        ..Default::default()
    };

    let deltas = DiscoveryService::new(pool.clone())
        .rediscover(connection.id, &connector)
        .await
        .unwrap();

    assert_eq!(deltas.len(), 2);

    let new_delta = deltas.iter().find(|d| d.action == DeltaAction::New).unwrap();
    assert_eq!(new_delta.fqn, "analytics.brand_new");
    assert_eq!(new_delta.schema_name, "analytics");
    assert_eq!(new_delta.table_name, "brand_new");

    let dropped = deltas.iter().find(|d| d.action == DeltaAction::Dropped).unwrap();
    assert_eq!(dropped.fqn, "analytics.retired");
}

#[tokio::test]
async fn rediscovery_is_read_only() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    create_test_table(&pool, connection.id, "analytics", "retired", None).await;

    let connector = FakeConnector {
        schemas: vec!["analytics".to_string()],
        tables: vec![("analytics".to_string(), "brand_new".to_string())],
        ..Default::default()
    };

    DiscoveryService::new(pool.clone())
        .rediscover(connection.id, &connector)
        .await
        .unwrap();

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM monitored_tables").fetch_one(&pool).await.unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn rediscovery_with_matching_catalog_is_empty() {
    let pool = create_test_db().await;
    let connection = create_test_connection(&pool, "wh").await;
    create_test_table(&pool, connection.id, "analytics", "orders", None).await;

    let connector = FakeConnector {
        schemas: vec!["analytics".to_string()],
        tables: vec![("analytics".to_string(), "orders".to_string())],
        ..Default::default()
    };

    let deltas = DiscoveryService::new(pool.clone())
        .rediscover(connection.id, &connector)
        .await
        .unwrap();
    assert!(deltas.is_empty());
}
