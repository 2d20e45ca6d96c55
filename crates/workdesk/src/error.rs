//! Error types shared by services and routes

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for core operations
pub type AppResult<T> = Result<T, AppError>;

/// Core error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Absent, soft-deleted, or hidden from the caller by an access filter
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Permission denied: {action}")]
    Forbidden { action: String },

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Cannot remove team owner")]
    CannotRemoveOwner,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        AppError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn forbidden(action: impl Into<String>) -> Self {
        AppError::Forbidden {
            action: action.into(),
        }
    }

    /// Convert to API error code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Forbidden { .. } => "FORBIDDEN",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::Conflict(_) => "CONFLICT",
            AppError::CannotRemoveOwner => "CANNOT_REMOVE_OWNER",
            AppError::Database(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) | AppError::CannotRemoveOwner => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return AppError::Conflict(db_err.message().to_string());
            }
        }
        AppError::Database(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Error body in the common response envelope
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Storage details stay in the log
        let message = match &self {
            AppError::Database(detail) | AppError::Internal(detail) => {
                tracing::error!(code = self.code(), error = %detail, "request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = ApiError {
            success: false,
            code: self.code().to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}
