use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/installations",
            get(commands::installation::list_installations_axum)
                .post(commands::installation::create_installation_axum),
        )
        .route(
            "/api/installations/pending",
            get(commands::installation::get_pending_installations_axum),
        )
        .route(
            "/api/installations/by-date",
            get(commands::installation::get_installations_by_date_axum),
        )
        .route(
            "/api/installations/stats",
            get(commands::installation::get_installation_stats_axum),
        )
        .route(
            "/api/installations/:id",
            get(commands::installation::get_installation_axum)
                .put(commands::installation::update_installation_axum)
                .delete(commands::installation::cancel_installation_axum),
        )
        .route(
            "/api/installations/:id/status",
            patch(commands::installation::update_installation_status_axum),
        )
        .route(
            "/api/installations/:id/payment",
            patch(commands::installation::update_installation_payment_axum),
        )
        .route(
            "/api/installations/:id/complete",
            post(commands::installation::complete_installation_axum),
        )
        // Timer
        .route(
            "/api/installations/:id/timer",
            get(commands::installation::get_timer_axum),
        )
        .route(
            "/api/installations/:id/timer/start",
            post(commands::installation::start_timer_axum),
        )
        .route(
            "/api/installations/:id/timer/stop",
            post(commands::installation::stop_timer_axum),
        )
}
