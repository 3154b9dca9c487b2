//! Vigil Library
//!
//! Core modules of the Vigil data-quality observability platform.

use sqlx::SqlitePool;
use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::Config;
pub use services::{
    Architect, ConnectionService, ConnectorPoolManager, DiscoveryService, IncidentService,
    LineageGraph, LineageRefresher, LlmService, Notifier, OpenAiClient, Orchestrator, Scanner,
    StatsService, TableService,
};
pub use utils::{ApiError, ApiResult};

/// Application shared state
///
/// Rust's type system is the DI container: every service is constructed once
/// at boot and shared behind an Arc.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,

    pub pool_manager: Arc<ConnectorPoolManager>,
    pub notifier: Arc<Notifier>,

    pub connection_service: Arc<ConnectionService>,
    pub table_service: Arc<TableService>,
    pub incident_service: Arc<IncidentService>,
    pub stats_service: Arc<StatsService>,
    pub discovery_service: Arc<DiscoveryService>,
    pub lineage_graph: LineageGraph,
    pub scanner: Arc<Scanner>,

    /// Whether the background scan loop was started at boot.
    pub scanner_running: bool,
}
