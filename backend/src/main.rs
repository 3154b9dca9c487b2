use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use vigil::config::Config;
use vigil::db;
use vigil::models;
use vigil::services::{
    Architect, ConnectionService, ConnectorPoolManager, DiscoveryService, IncidentService,
    LineageGraph, LlmService, Notifier, OpenAiClient, Orchestrator, Scanner, StatsService,
    TableService, start_lineage_refresh_task, start_scan_task,
};
use vigil::utils::SecretBox;
use vigil::{AppState, handlers, middleware};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::system::health,
        handlers::system::status,
        handlers::system::stats,
        handlers::system::trigger_scan,

        handlers::connections::create_connection,
        handlers::connections::list_connections,
        handlers::connections::get_connection,
        handlers::connections::update_connection,
        handlers::connections::delete_connection,
        handlers::connections::test_connection,
        handlers::connections::discover,
        handlers::connections::rediscover,

        handlers::tables::create_table,
        handlers::tables::list_tables,
        handlers::tables::get_table,
        handlers::tables::update_table,
        handlers::tables::delete_table,
        handlers::tables::list_snapshots,

        handlers::incidents::list_incidents,
        handlers::incidents::get_incident,
        handlers::incidents::get_incident_report,
        handlers::incidents::approve_incident,
        handlers::incidents::dismiss_incident,

        handlers::lineage::get_full_graph,
        handlers::lineage::get_upstream,
        handlers::lineage::get_downstream,
        handlers::lineage::get_blast_radius,
    ),
    components(
        schemas(
            models::Connection,
            models::ConnectionResponse,
            models::ConnectionTestResponse,
            models::CreateConnectionRequest,
            models::UpdateConnectionRequest,
            models::Dialect,
            models::MonitoredTable,
            models::TableResponse,
            models::CreateTableRequest,
            models::UpdateTableRequest,
            models::CheckType,
            models::ColumnInfo,
            models::SnapshotResponse,
            models::Severity,
            models::AnomalyKind,
            models::AnomalyResponse,
            models::IncidentStatus,
            models::IncidentResponse,
            models::ApproveIncidentRequest,
            models::DismissIncidentRequest,
            models::Diagnosis,
            models::Recommendation,
            models::Remediation,
            models::RemediationAction,
            models::ActionStatus,
            models::IncidentReport,
            models::AnomalyDetailsSection,
            models::RootCauseSection,
            models::BlastRadiusSection,
            models::ReportAction,
            models::TimelineEvent,
            models::LineageNode,
            models::TraversalResponse,
            models::BlastRadius,
            models::FullGraph,
            models::GraphNode,
            models::GraphEdge,
            models::DiscoveryReport,
            models::TableProposal,
            models::TableRole,
            models::TableDelta,
            models::DeltaAction,
            models::RediscoveryResponse,
            models::HealthResponse,
            models::StatusResponse,
            models::StatsResponse,
            models::ScanTriggerResponse,
        )
    ),
    tags(
        (name = "System", description = "Health, status, and scan control"),
        (name = "Connections", description = "Warehouse connection management"),
        (name = "Discovery", description = "Warehouse discovery and rediscovery"),
        (name = "Tables", description = "Monitored table enrollment"),
        (name = "Incidents", description = "Incident review and reports"),
        (name = "Lineage", description = "Lineage graph queries"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    // The file-appender guard must outlive the server, so it is bound here.
    let _log_guard = if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("vigil.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
        Some(guard)
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
        None
    };

    tracing::info!("Vigil starting up");

    if config.database.url.is_none() {
        db::ensure_db_directory(&config.database.db_path)?;
    }
    let pool = db::create_pool(&config.database_url()).await?;
    tracing::info!("Database pool created and migrations applied");

    let secret_box = match &config.encryption.key {
        Some(key) => {
            let secret_box = SecretBox::from_base64_key(key)
                .map_err(|e| format!("Invalid ENCRYPTION_KEY: {}", e))?;
            tracing::info!("Connection URI encryption enabled");
            Some(Arc::new(secret_box))
        },
        None => {
            tracing::warn!("ENCRYPTION_KEY not set; connection URIs are stored in plaintext");
            None
        },
    };

    let pool_manager = Arc::new(ConnectorPoolManager::new());
    let notifier = Arc::new(Notifier::new());

    let llm_client = Arc::new(OpenAiClient::new(&config.llm));
    if llm_client.is_available() {
        tracing::info!("LLM diagnosis enabled (model: {})", config.llm.model);
    } else {
        tracing::warn!("OPENAI_API_KEY not set; diagnosis falls back to rules");
    }

    let connection_service = Arc::new(ConnectionService::new(
        pool.clone(),
        secret_box,
        Arc::clone(&pool_manager),
    ));
    let table_service = Arc::new(TableService::new(pool.clone()));
    let incident_service = Arc::new(IncidentService::new(pool.clone(), Arc::clone(&notifier)));
    let stats_service = Arc::new(StatsService::new(pool.clone()));
    let discovery_service = Arc::new(DiscoveryService::new(pool.clone()));
    let lineage_graph = LineageGraph::new(pool.clone());

    let architect = Architect::new(pool.clone(), lineage_graph.clone(), llm_client);
    let orchestrator = Arc::new(Orchestrator::new(pool.clone(), architect, Arc::clone(&notifier)));

    let scanner = Arc::new(Scanner::new(
        pool.clone(),
        Arc::clone(&pool_manager),
        Arc::clone(&connection_service),
        orchestrator,
        Arc::clone(&notifier),
    ));

    let mut scanner_running = false;
    if config.scanner.enabled {
        let _scan_shutdown =
            start_scan_task(Arc::clone(&scanner), config.scanner.scan_interval_secs);
        let _lineage_shutdown = start_lineage_refresh_task(
            Arc::clone(&scanner),
            config.scanner.lineage_refresh_secs,
        );
        scanner_running = true;
    } else {
        tracing::warn!("Background scanner disabled by configuration");
    }

    let app_state = Arc::new(AppState {
        db: pool.clone(),
        pool_manager,
        notifier,
        connection_service,
        table_service,
        incident_service,
        stats_service,
        discovery_service,
        lineage_graph,
        scanner,
        scanner_running,
    });

    let auth_state = middleware::AuthState::new(config.auth.api_key.clone());

    let public_routes = Router::new()
        .route("/api/v1/health", get(handlers::system::health))
        .route("/api/v1/ws", get(handlers::websocket::websocket_handler))
        .with_state(Arc::clone(&app_state));

    let protected_routes = Router::new()
        .route("/api/v1/status", get(handlers::system::status))
        .route("/api/v1/stats", get(handlers::system::stats))
        .route("/api/v1/scan/trigger", post(handlers::system::trigger_scan))
        .route(
            "/api/v1/connections",
            post(handlers::connections::create_connection)
                .get(handlers::connections::list_connections),
        )
        .route(
            "/api/v1/connections/:id",
            get(handlers::connections::get_connection)
                .put(handlers::connections::update_connection)
                .delete(handlers::connections::delete_connection),
        )
        .route("/api/v1/connections/:id/test", post(handlers::connections::test_connection))
        .route("/api/v1/connections/:id/discover", post(handlers::connections::discover))
        .route("/api/v1/connections/:id/rediscover", post(handlers::connections::rediscover))
        .route(
            "/api/v1/tables",
            post(handlers::tables::create_table).get(handlers::tables::list_tables),
        )
        .route(
            "/api/v1/tables/:id",
            get(handlers::tables::get_table)
                .put(handlers::tables::update_table)
                .delete(handlers::tables::delete_table),
        )
        .route("/api/v1/tables/:id/snapshots", get(handlers::tables::list_snapshots))
        .route("/api/v1/incidents", get(handlers::incidents::list_incidents))
        .route("/api/v1/incidents/:id", get(handlers::incidents::get_incident))
        .route("/api/v1/incidents/:id/report", get(handlers::incidents::get_incident_report))
        .route("/api/v1/incidents/:id/approve", post(handlers::incidents::approve_incident))
        .route("/api/v1/incidents/:id/dismiss", post(handlers::incidents::dismiss_incident))
        .route("/api/v1/lineage/graph", get(handlers::lineage::get_full_graph))
        .route("/api/v1/lineage/:table/upstream", get(handlers::lineage::get_upstream))
        .route("/api/v1/lineage/:table/downstream", get(handlers::lineage::get_downstream))
        .route("/api/v1/lineage/:table/blast-radius", get(handlers::lineage::get_blast_radius))
        .with_state(Arc::clone(&app_state))
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::api_key_middleware,
        ));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public_routes)
        .merge(protected_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);
    tracing::info!("Vigil is ready to serve requests");

    axum::serve(listener, app).await?;

    Ok(())
}
