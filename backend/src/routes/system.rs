use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(commands::system::root_axum))
        .route("/health", get(commands::system::health_axum))
        .route("/api/system/ping", get(commands::system::ping_axum))
}
