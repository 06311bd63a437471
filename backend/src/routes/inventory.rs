use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/inventory/summary",
            get(commands::inventory::get_inventory_summary_axum),
        )
        .route(
            "/api/inventory/products",
            get(commands::inventory::get_products_inventory_axum),
        )
        .route(
            "/api/inventory/products/:product_id/movements",
            get(commands::inventory::get_product_movements_axum),
        )
        .route(
            "/api/inventory/movements",
            get(commands::inventory::list_movements_axum)
                .post(commands::inventory::create_movement_axum),
        )
        .route(
            "/api/inventory/adjust-stock",
            post(commands::inventory::adjust_stock_axum),
        )
}
