use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, patch, put},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/warehouses",
            get(commands::warehouse::list_warehouses_axum)
                .post(commands::warehouse::create_warehouse_axum),
        )
        .route(
            "/api/warehouses/inventory",
            get(commands::warehouse::get_inventory_with_warehouses_axum),
        )
        .route(
            "/api/warehouses/stock/:product_id",
            get(commands::warehouse::get_product_warehouse_stock_axum)
                .put(commands::warehouse::set_warehouse_stock_axum),
        )
        .route(
            "/api/warehouses/:id",
            put(commands::warehouse::update_warehouse_axum),
        )
        // Order board
        .route(
            "/api/warehouse/orders",
            get(commands::warehouse::get_order_board_axum),
        )
        .route(
            "/api/warehouse/orders/:id",
            get(commands::installation::get_installation_axum),
        )
        .route(
            "/api/warehouse/orders/:id/prepare",
            patch(commands::warehouse::mark_prepared_axum),
        )
        .route(
            "/api/warehouse/orders/:id/deliver",
            patch(commands::warehouse::mark_delivered_axum),
        )
}
