use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/webhooks/voice/conversation",
            post(commands::webhook::receive_voice_conversation_axum),
        )
        .route(
            "/api/webhooks/voice/test",
            post(commands::webhook::voice_webhook_test_axum),
        )
        .route(
            "/api/webhooks/voice/status",
            get(commands::webhook::voice_webhook_status_axum),
        )
}
