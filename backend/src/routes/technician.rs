use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, patch, post, put},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/technicians",
            get(commands::technician::list_technicians_axum)
                .post(commands::technician::create_technician_axum),
        )
        .route(
            "/api/technicians/available",
            get(commands::technician::get_available_technicians_axum),
        )
        .route(
            "/api/technicians/locations",
            get(commands::technician::get_latest_locations_axum),
        )
        .route(
            "/api/technicians/:id",
            get(commands::technician::get_technician_axum)
                .put(commands::technician::update_technician_axum)
                .delete(commands::technician::deactivate_technician_axum),
        )
        .route(
            "/api/technicians/:id/schedule",
            get(commands::technician::get_technician_schedule_axum),
        )
        .route(
            "/api/technicians/:id/availability",
            patch(commands::technician::update_availability_axum),
        )
        .route(
            "/api/technicians/:id/pin",
            put(commands::technician::set_pin_axum),
        )
        .route(
            "/api/technicians/:id/location",
            post(commands::technician::record_location_axum),
        )
}
