use crate::error::ZafesysResult;
use crate::state::AppState;
use axum::{extract::State as AxumState, Json};
use serde::Serialize;

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn root_axum(AxumState(state): AxumState<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: state.config.app_name.clone(),
        version: CURRENT_VERSION,
        status: "running",
    })
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
}

/// Reports degraded instead of failing so load balancers can read the body.
pub async fn health_axum(AxumState(state): AxumState<AppState>) -> ZafesysResult<Json<HealthReport>> {
    let database = match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!("Health check could not reach the database: {}", e);
            "unreachable"
        }
    };

    Ok(Json(HealthReport {
        status: if database == "connected" { "healthy" } else { "degraded" },
        database,
        version: CURRENT_VERSION,
    }))
}

pub async fn ping_axum() -> &'static str {
    "pong"
}
