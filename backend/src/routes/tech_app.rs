use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tech/login", post(commands::tech_app::tech_login_axum))
        .route(
            "/api/tech/my-installations",
            get(commands::tech_app::get_my_installations_axum),
        )
        .route(
            "/api/tech/installations/:id",
            get(commands::tech_app::get_tech_installation_axum),
        )
        .route(
            "/api/tech/installations/:id/status",
            patch(commands::tech_app::tech_update_status_axum),
        )
        .route(
            "/api/tech/installations/:id/confirm-payment",
            post(commands::tech_app::confirm_payment_axum),
        )
        .route(
            "/api/tech/installations/:id/complete",
            post(commands::tech_app::tech_complete_axum),
        )
        .route(
            "/api/tech/availability",
            patch(commands::tech_app::tech_availability_axum),
        )
        .route("/api/tech/profile", get(commands::tech_app::tech_profile_axum))
}
