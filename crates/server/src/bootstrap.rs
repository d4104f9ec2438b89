use std::sync::Arc;

use rxroute_core::admission::AdmissionPolicy;
use rxroute_core::audit::TracingAuditSink;
use rxroute_core::config::{AppConfig, ConfigError, RoutingMode};
use rxroute_core::routing::{LocalOrderRouter, OrderRouter};
use rxroute_db::{connect_with_config, migrations, DbPool, SqlCartRepository, SqlCatalogRepository};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;
use crate::routing_client::HttpOrderRouter;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("routing client could not be built: {0}")]
    RoutingClient(#[source] reqwest::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let catalog = Arc::new(SqlCatalogRepository::new(db_pool.clone()));
    let router = order_router(&config, catalog.clone())?;
    info!(
        event_name = "system.bootstrap.routing_selected",
        correlation_id = "bootstrap",
        routing_mode = ?config.routing.mode,
        timeout_ms = config.routing.timeout_ms,
        "routing implementation selected"
    );

    let api = ApiState::new(
        catalog,
        router,
        Arc::new(SqlCartRepository::new(db_pool.clone())),
        Arc::new(TracingAuditSink),
        AdmissionPolicy::from_config(&config),
    );

    Ok(Application { config, db_pool, api })
}

fn order_router(
    config: &AppConfig,
    catalog: Arc<SqlCatalogRepository>,
) -> Result<Arc<dyn OrderRouter>, BootstrapError> {
    match config.routing.mode {
        RoutingMode::Local => Ok(Arc::new(LocalOrderRouter::new(catalog))),
        RoutingMode::Remote => {
            let client = HttpOrderRouter::from_config(&config.routing).ok_or_else(|| {
                ConfigError::Validation(
                    "routing.remote_url and routing.api_key are required when routing.mode = \"remote\""
                        .to_string(),
                )
            })?;
            let client = client.map_err(BootstrapError::RoutingClient)?;
            info!(
                event_name = "system.bootstrap.remote_routing",
                correlation_id = "bootstrap",
                endpoint = client.endpoint(),
                "remote routing client configured"
            );
            Ok(Arc::new(client))
        }
    }
}
