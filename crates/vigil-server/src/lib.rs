//! Vigil server library logic.

pub mod api;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use config::DatabaseConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use vigil_db::{provision, Database, DbError, ServerConnector, TableNaming, ENTITIES};
use vigil_types::{Asset, Dataset, Record};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The provisioned, synchronized database.
    pub db: Arc<Database>,
}

/// Maximum request body size (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/get-datasets", get(api::list_handler::<Dataset>))
        .route("/api/get-records", get(api::list_handler::<Record>))
        .route("/api/get-assets", get(api::list_handler::<Asset>))
        .route("/api/add-record", post(api::add_record_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}

/// Brings the configured database to a usable state.
///
/// Provisions the database (and schema), opens the long-lived handle, then
/// synchronizes every entity table. The listener must not be bound before
/// this returns.
///
/// # Errors
///
/// Returns the first `DbError` encountered; the handle is shut down if
/// synchronization fails after it was opened.
pub async fn init_database(config: &DatabaseConfig) -> Result<Database, DbError> {
    let source = config.data_source();
    tracing::info!(
        driver = %source.driver(),
        data_source = %source.redacted(),
        db_name = %source.database(),
        "initializing database"
    );

    provision(&source, &ServerConnector).await?;

    let naming = TableNaming::new(&config.table_prefix)?;
    let db = Database::open(&source, naming, config.runtime_settings()).await?;

    match db.sync_all(ENTITIES).await {
        Ok(report) => {
            if !report.is_empty() {
                tracing::info!(
                    tables = ?report.tables_created,
                    columns = ?report.columns_added,
                    "database schema updated"
                );
            }
            Ok(db)
        }
        Err(e) => {
            db.shutdown().await;
            Err(e)
        }
    }
}
