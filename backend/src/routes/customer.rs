use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/customers",
            get(commands::customer::list_customers_axum)
                .post(commands::customer::create_customer_axum),
        )
        .route(
            "/api/customers/:id",
            get(commands::customer::get_customer_axum)
                .put(commands::customer::update_customer_axum)
                .delete(commands::customer::deactivate_customer_axum),
        )
}
