use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZafesysError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("Insufficient stock. Available: {available}, requested: {requested}")]
    InsufficientStock { available: i32, requested: i32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

impl ZafesysError {
    pub fn not_found(entity: &str) -> Self {
        ZafesysError::NotFound(entity.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ZafesysError::NotFound(_) => StatusCode::NOT_FOUND,
            ZafesysError::InvalidState(_) | ZafesysError::InsufficientStock { .. } => {
                StatusCode::CONFLICT
            }
            ZafesysError::Validation(_) | ZafesysError::Json(_) => StatusCode::BAD_REQUEST,
            ZafesysError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ZafesysError::Forbidden(_) => StatusCode::FORBIDDEN,
            ZafesysError::Database(_)
            | ZafesysError::Migration(_)
            | ZafesysError::Internal(_)
            | ZafesysError::Bcrypt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type ZafesysResult<T> = Result<T, ZafesysError>;

impl IntoResponse for ZafesysError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match &self {
            ZafesysError::Database(e) => {
                tracing::error!("Database Error: {:?}", e);
                "Database operation failed".to_string()
            }
            ZafesysError::Migration(e) => {
                tracing::error!("Migration Error: {:?}", e);
                "Database schema is not ready".to_string()
            }
            ZafesysError::Internal(msg) => {
                tracing::error!("Internal Error: {}", msg);
                "Internal server error".to_string()
            }
            ZafesysError::Bcrypt(e) => {
                tracing::error!("Bcrypt Error: {:?}", e);
                "Internal server error".to_string()
            }
            ZafesysError::Validation(msg)
            | ZafesysError::Unauthorized(msg)
            | ZafesysError::Forbidden(msg) => msg.clone(),
            ZafesysError::Json(e) => format!("Invalid JSON: {}", e),
            ZafesysError::NotFound(_)
            | ZafesysError::InvalidState(_)
            | ZafesysError::InsufficientStock { .. } => self.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_4xx() {
        assert_eq!(
            ZafesysError::not_found("Installation").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ZafesysError::InvalidState("Timer has not been started".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ZafesysError::InsufficientStock {
                available: 3,
                requested: 5
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ZafesysError::Validation("PIN must be 4 to 6 digits".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ZafesysError::not_found("Lead").to_string(),
            "Lead not found"
        );
        assert_eq!(
            ZafesysError::InsufficientStock {
                available: 3,
                requested: 5
            }
            .to_string(),
            "Insufficient stock. Available: 3, requested: 5"
        );
    }
}
