use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/analytics/installations",
        get(commands::analytics::get_installation_analytics_axum),
    )
}
