//! Handler errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

/// `{"error": "..."}`. Database details stay in the log.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error = match &self {
            AppError::Database(e) => {
                tracing::error!(error = ?e, "database error");
                "Database error".to_string()
            }
            AppError::BadRequest(msg) => {
                tracing::warn!(reason = %msg, "rejected request");
                msg.clone()
            }
            AppError::NotFound(msg) => msg.clone(),
        };

        (self.status(), Json(ErrorBody { error })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
