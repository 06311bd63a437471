use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/products",
            get(commands::product::list_products_axum)
                .post(commands::product::create_product_axum),
        )
        .route(
            "/api/products/search",
            get(commands::product::search_products_axum),
        )
        .route(
            "/api/products/low-stock",
            get(commands::product::get_low_stock_products_axum),
        )
        .route(
            "/api/products/:id",
            get(commands::product::get_product_axum)
                .put(commands::product::update_product_axum)
                .delete(commands::product::deactivate_product_axum),
        )
}
