use crate::state::AppState;
use axum::Router;

pub mod analytics;
pub mod customer;
pub mod distributor;
pub mod installation;
pub mod inventory;
pub mod lead;
pub mod product;
pub mod system;
pub mod tech_app;
pub mod technician;
pub mod warehouse;
pub mod webhook;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(system::router())
        .merge(installation::router())
        .merge(lead::router())
        .merge(customer::router())
        .merge(product::router())
        .merge(inventory::router())
        .merge(technician::router())
        .merge(tech_app::router())
        .merge(distributor::router())
        .merge(warehouse::router())
        .merge(analytics::router())
        .merge(webhook::router())
}
