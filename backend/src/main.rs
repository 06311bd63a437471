use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod db;
mod error;
mod middleware;
mod routes;
mod state;

#[cfg(test)]
mod integration_tests;

use config::AppConfig;
use error::{ZafesysError, ZafesysResult};
use state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> ZafesysResult<()> {
    let config = AppConfig::from_env();
    tracing::info!("Starting {}...", config.app_name);

    let pool = db::init_pool(&config).await?;
    tracing::info!("Database connection established");
    if let Err(e) = db::init_database(&pool).await {
        tracing::error!("Failed to run migrations: {}", e);
    }

    let port = config.port;
    let app = build_app(AppState::new(pool, config));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ZafesysError::Internal(format!("Cannot bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| ZafesysError::Internal(e.to_string()))?;
    Ok(())
}

pub(crate) fn build_app(state: AppState) -> axum::Router {
    routes::create_router()
        .layer(axum::middleware::from_fn(
            middleware::wrap_response_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
