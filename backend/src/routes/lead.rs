use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/leads",
            get(commands::lead::list_leads_axum).post(commands::lead::create_lead_axum),
        )
        .route("/api/leads/kanban", get(commands::lead::get_leads_kanban_axum))
        .route("/api/leads/stats", get(commands::lead::get_lead_stats_axum))
        .route(
            "/api/leads/:id",
            get(commands::lead::get_lead_axum)
                .put(commands::lead::update_lead_axum)
                .delete(commands::lead::delete_lead_axum),
        )
        .route(
            "/api/leads/:id/status",
            patch(commands::lead::update_lead_status_axum),
        )
        .route(
            "/api/leads/:id/convert",
            post(commands::customer::convert_lead_axum),
        )
}
