use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use rxroute_core::config::RoutingMode;
use rxroute_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    routing_mode: RoutingMode,
}

impl HealthState {
    pub fn new(db_pool: DbPool, routing_mode: RoutingMode) -> Self {
        Self { db_pool, routing_mode }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub catalog: HealthCheck,
    pub routing_mode: RoutingMode,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";
    let catalog = catalog_check(&state.db_pool).await;

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "rxroute-server runtime initialized".to_string(),
        },
        database,
        catalog,
        routing_mode: state.routing_mode,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

/// An empty catalog is reported but does not fail readiness; orders simply block.
async fn catalog_check(pool: &DbPool) -> HealthCheck {
    let active = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pharmacy WHERE active = 1")
        .fetch_one(pool)
        .await;
    match active {
        Ok(0) => HealthCheck { status: "empty", detail: "no active pharmacies".to_string() },
        Ok(count) => {
            HealthCheck { status: "ready", detail: format!("{count} active pharmacies") }
        }
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("catalog query failed: {error}") }
        }
    }
}
