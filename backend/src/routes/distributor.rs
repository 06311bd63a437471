use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/distributors",
            get(commands::distributor::list_distributors_axum)
                .post(commands::distributor::create_distributor_axum),
        )
        .route(
            "/api/distributors/:id",
            get(commands::distributor::get_distributor_axum)
                .put(commands::distributor::update_distributor_axum)
                .delete(commands::distributor::deactivate_distributor_axum),
        )
        .route(
            "/api/distributors/:id/sales",
            post(commands::distributor::create_sale_axum),
        )
        .route(
            "/api/distributor-sales",
            get(commands::distributor::list_sales_axum),
        )
        .route(
            "/api/distributor-sales/:sale_id",
            put(commands::distributor::update_sale_axum)
                .delete(commands::distributor::delete_sale_axum),
        )
}
